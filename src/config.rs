//! Configuration management for Depot Transfer
//!
//! This module provides unified configuration management with automatic
//! first-run initialization, multi-source loading, and zero-config defaults.
//! The TOML sections map onto the runtime configuration of each component.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::FileCacheConfig;
use crate::app::manager::ManagerConfig;
use crate::app::mapped::PathMappedConfig;
use crate::app::resource::Location;
use crate::app::transport::HttpTransportConfig;
use crate::app::worker::PoolConfig;
use crate::constants::{cache, http, logging, mapped, nfc, transfer, workers};
use crate::errors::{AppError, ConfigError, Result};

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// Lock-coordinated file cache
    #[default]
    File,
    /// Content-addressed store behind a path database
    PathMapped,
}

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Local storage settings
    pub storage: StorageConfigToml,
    /// Path-mapped store settings (used when `storage.kind = "path-mapped"`)
    pub path_mapped: PathMappedConfigToml,
    /// Worker pool and batch retry settings
    pub pool: PoolConfigToml,
    /// Not-found cache settings
    pub nfc: NfcConfigToml,
    /// HTTP transport settings
    pub http: HttpConfigToml,
    /// Request orchestration settings
    pub transfer: TransferConfigToml,
    /// Remote locations, in fallback order
    pub locations: Vec<Location>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfigToml {
    /// Which cache provider backs the engine
    pub kind: StorageKind,
    /// Cache directory path (OS cache dir if unset)
    pub cache_root: Option<PathBuf>,
    /// Default age in seconds after which cached content expires
    pub default_timeout_secs: u64,
    /// Lower bound in seconds for any location's cache timeout
    pub min_timeout_secs: u64,
    /// How long lock waits may block, in seconds
    pub lock_timeout_secs: u64,
    /// Write `.md5` sidecars next to stored content
    pub checksums: bool,
}

impl Default for StorageConfigToml {
    fn default() -> Self {
        Self {
            kind: StorageKind::File,
            cache_root: None,
            default_timeout_secs: cache::DEFAULT_TIMEOUT.as_secs(),
            min_timeout_secs: cache::MIN_TIMEOUT.as_secs(),
            lock_timeout_secs: cache::LOCK_TIMEOUT.as_secs(),
            checksums: true,
        }
    }
}

/// TOML-friendly path-mapped store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathMappedConfigToml {
    /// Path database file (defaults to `<cache_root>/pathdb.sqlite`)
    pub database: Option<PathBuf>,
    /// Blob directory (defaults to `<cache_root>/blobs`)
    pub blob_dir: Option<PathBuf>,
    /// Seconds between logical delete and physical reclaim
    pub gc_grace_period_secs: u64,
    /// Seconds between periodic reclaim sweeps
    pub gc_interval_secs: u64,
}

impl Default for PathMappedConfigToml {
    fn default() -> Self {
        Self {
            database: None,
            blob_dir: None,
            gc_grace_period_secs: mapped::GC_GRACE_PERIOD.as_secs(),
            gc_interval_secs: mapped::GC_INTERVAL.as_secs(),
        }
    }
}

/// TOML-friendly worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfigToml {
    /// Number of concurrently running transfer jobs
    pub worker_count: usize,
    /// Retry budget for retryable errors during batch retrieval
    pub max_retries: u32,
    /// Base retry delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in seconds
    pub retry_max_delay_secs: u64,
    /// Timeout for a single job in seconds
    pub job_timeout_secs: u64,
    /// Batch straggler polling interval in milliseconds
    pub batch_poll_interval_ms: u64,
}

impl Default for PoolConfigToml {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_retries: workers::MAX_RETRIES,
            retry_base_delay_ms: transfer::RETRY_BASE_DELAY.as_millis() as u64,
            retry_max_delay_secs: transfer::RETRY_MAX_DELAY.as_secs(),
            job_timeout_secs: workers::DEFAULT_JOB_TIMEOUT.as_secs(),
            batch_poll_interval_ms: transfer::BATCH_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// TOML-friendly not-found cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NfcConfigToml {
    /// Seconds a resource stays recorded missing (0 disables the cache)
    pub ttl_secs: u64,
}

impl Default for NfcConfigToml {
    fn default() -> Self {
        Self {
            ttl_secs: nfc::DEFAULT_TTL.as_secs(),
        }
    }
}

/// TOML-friendly HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfigToml {
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum idle connections per host
    pub pool_max_per_host: usize,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpConfigToml {
    fn default() -> Self {
        Self {
            tcp_keepalive_secs: Some(30),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: http::DEFAULT_RATE_LIMIT_RPS,
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

/// TOML-friendly orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfigToml {
    /// Network wait budget in seconds for locations without their own
    pub default_timeout_secs: u64,
    /// Persist fresh remote listings next to cached directories
    pub store_listings: bool,
}

impl Default for TransferConfigToml {
    fn default() -> Self {
        Self {
            default_timeout_secs: transfer::DEFAULT_TIMEOUT.as_secs(),
            store_listings: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Show module targets in log lines
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
            show_target: false,
        }
    }
}

impl AppConfig {
    /// Validate every section, including each location
    pub fn validate(&self) -> Result<()> {
        self.storage
            .to_file_cache_config()
            .validate()
            .map_err(|reason| invalid("storage", reason))?;
        self.storage
            .to_path_mapped_config(&self.path_mapped)
            .validate()
            .map_err(|reason| invalid("path_mapped", reason))?;
        self.pool.to_runtime_config().validate()?;
        self.http
            .to_runtime_config()
            .validate()
            .map_err(|reason| invalid("http", reason))?;
        self.transfer.to_runtime_config().validate()?;

        let mut names = std::collections::HashSet::new();
        for location in &self.locations {
            location.validate()?;
            if !names.insert(location.name.as_str()) {
                return Err(invalid(
                    "locations.name",
                    format!("Duplicate location name '{}'", location.name),
                ));
            }
        }
        Ok(())
    }

    /// Configured locations, shared
    pub fn runtime_locations(&self) -> Vec<Arc<Location>> {
        self.locations.iter().cloned().map(Arc::new).collect()
    }

    /// Look up a configured location by name
    pub fn location(&self, name: &str) -> Option<Arc<Location>> {
        self.locations
            .iter()
            .find(|location| location.name == name)
            .cloned()
            .map(Arc::new)
    }

    /// Load configuration with multi-source precedence:
    /// 1. Default values
    /// 2. Config file (explicit path, or the first found in the search paths)
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        let config_path = if let Some(ref path) = config_file_override {
            Some(path.clone())
        } else {
            Self::find_config_file().await?
        };

        if let Some(path) = config_path {
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                config = Self::load_from_file(&path).await?;
            } else if config_file_override.is_some() {
                return Err(ConfigError::NotFound { path }.into());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Initialize configuration on first run
    ///
    /// Creates a default config file if none exists and notifies the user
    pub async fn initialize_first_run() -> Result<Option<PathBuf>> {
        let config_path = Self::get_default_config_path()?;

        if config_path.exists() {
            return Ok(Some(config_path));
        }

        info!("Creating default configuration file...");

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::generic(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let config_content = Self::generate_default_config_content();

        tokio::fs::write(&config_path, config_content)
            .await
            .map_err(|e| {
                AppError::generic(format!(
                    "Failed to write config file {}: {}",
                    config_path.display(),
                    e
                ))
            })?;

        println!("Created default configuration file:");
        println!("   {}", config_path.display());
        println!("   Add [[locations]] entries to start fetching.");
        println!();

        Ok(Some(config_path))
    }

    /// Find configuration file in standard locations
    async fn find_config_file() -> Result<Option<PathBuf>> {
        let search_paths = vec![
            PathBuf::from("./depot-transfer.toml"),
            Self::get_default_config_path()?,
            #[cfg(unix)]
            PathBuf::from("/etc/depot-transfer/config.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Ok(Some(path));
            }
        }

        debug!("No config file found in standard locations");
        Ok(None)
    }

    /// Get the default config file path for the current user
    pub fn get_default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::generic("Could not determine user config directory"))?;

        Ok(config_dir.join(cache::APP_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::generic(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(ConfigError::from)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# Depot Transfer Configuration
# This file was automatically generated on first run.

[storage]
# "file" for the lock-coordinated file cache, "path-mapped" for the
# content-addressed store
kind = "file"
# cache_root = "/path/to/custom/cache"

# Cached content expires after this many seconds unless a location sets
# its own cache_timeout_secs
default_timeout_secs = {default_timeout}
min_timeout_secs = {min_timeout}
lock_timeout_secs = {lock_timeout}

# Write .md5 sidecars next to stored content
checksums = true

[path_mapped]
# database = "/path/to/pathdb.sqlite"
# blob_dir = "/path/to/blobs"
gc_grace_period_secs = {gc_grace}
gc_interval_secs = {gc_interval}

[pool]
worker_count = {workers}
max_retries = {max_retries}
retry_base_delay_ms = 100
retry_max_delay_secs = 10
job_timeout_secs = {job_timeout}
batch_poll_interval_ms = 5000

[nfc]
# Seconds a missing resource is remembered (0 disables)
ttl_secs = {nfc_ttl}

[http]
tcp_keepalive_secs = 30
tcp_nodelay = true
pool_idle_timeout_secs = 90
pool_max_per_host = {pool_max}
connect_timeout_secs = 30
rate_limit_rps = {rps}
user_agent = "{user_agent}"

[transfer]
default_timeout_secs = {transfer_timeout}
store_listings = true

# Locations are tried in the order listed
# [[locations]]
# name = "central"
# uri = "https://repo.example.org/maven2"
# allows_downloading = true
# allows_storing = true
# allows_publishing = false
# cache_timeout_secs = 86400
# connection_timeout_secs = 30

[logging]
level = "warn"
show_target = false
"#,
            default_timeout = cache::DEFAULT_TIMEOUT.as_secs(),
            min_timeout = cache::MIN_TIMEOUT.as_secs(),
            lock_timeout = cache::LOCK_TIMEOUT.as_secs(),
            gc_grace = mapped::GC_GRACE_PERIOD.as_secs(),
            gc_interval = mapped::GC_INTERVAL.as_secs(),
            workers = workers::DEFAULT_WORKER_COUNT,
            max_retries = workers::MAX_RETRIES,
            job_timeout = workers::DEFAULT_JOB_TIMEOUT.as_secs(),
            nfc_ttl = nfc::DEFAULT_TTL.as_secs(),
            pool_max = http::POOL_MAX_PER_HOST,
            rps = http::DEFAULT_RATE_LIMIT_RPS,
            user_agent = http::USER_AGENT,
            transfer_timeout = transfer::DEFAULT_TIMEOUT.as_secs(),
        )
    }
}

fn invalid(field: &str, reason: String) -> AppError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: String::new(),
        reason,
    }
    .into()
}

impl StorageConfigToml {
    /// Convert to runtime FileCacheConfig
    pub fn to_file_cache_config(&self) -> FileCacheConfig {
        FileCacheConfig {
            cache_root: self.cache_root.clone(),
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            min_timeout: Duration::from_secs(self.min_timeout_secs),
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
        }
    }

    /// Convert to runtime PathMappedConfig, sharing root and timeouts
    pub fn to_path_mapped_config(&self, section: &PathMappedConfigToml) -> PathMappedConfig {
        PathMappedConfig {
            root: self.cache_root.clone(),
            database: section.database.clone(),
            blob_dir: section.blob_dir.clone(),
            gc_grace_period: Duration::from_secs(section.gc_grace_period_secs),
            gc_interval: Duration::from_secs(section.gc_interval_secs),
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            min_timeout: Duration::from_secs(self.min_timeout_secs),
        }
    }
}

impl PoolConfigToml {
    /// Convert to runtime PoolConfig
    pub fn to_runtime_config(&self) -> PoolConfig {
        PoolConfig {
            worker_count: self.worker_count,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_secs(self.retry_max_delay_secs),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            batch_poll_interval: Duration::from_millis(self.batch_poll_interval_ms),
            backoff_jitter_percentage: transfer::RETRY_JITTER,
        }
    }
}

impl NfcConfigToml {
    /// Record lifetime, `None` when the cache is disabled
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl HttpConfigToml {
    /// Convert to runtime HttpTransportConfig
    pub fn to_runtime_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
            user_agent: self.user_agent.clone(),
        }
    }
}

impl TransferConfigToml {
    /// Convert to runtime ManagerConfig
    pub fn to_runtime_config(&self) -> ManagerConfig {
        ManagerConfig {
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            store_listings: self.store_listings,
        }
    }
}
