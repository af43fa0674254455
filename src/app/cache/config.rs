//! File cache configuration types and defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

/// Configuration for the lock-coordinated file cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCacheConfig {
    /// Root directory for cache storage (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Age after which cached files expire unless the location overrides it
    pub default_timeout: Duration,
    /// Lower bound applied to every location's timeout
    pub min_timeout: Duration,
    /// How long lock waits may block
    pub lock_timeout: Duration,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            default_timeout: cache::DEFAULT_TIMEOUT,
            min_timeout: cache::MIN_TIMEOUT,
            lock_timeout: cache::LOCK_TIMEOUT,
        }
    }
}

impl FileCacheConfig {
    /// Create a configuration rooted at `cache_root`
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_min_timeout(mut self, timeout: Duration) -> Self {
        self.min_timeout = timeout;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Resolve the cache root, falling back to the OS cache directory
    pub fn resolve_root(&self) -> CacheResult<PathBuf> {
        match &self.cache_root {
            Some(path) => Ok(path.clone()),
            None => default_cache_dir(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.lock_timeout.is_zero() {
            return Err("lock_timeout must be greater than 0".to_string());
        }
        if self.default_timeout < self.min_timeout {
            return Err(format!(
                "default_timeout ({:?}) must not be below min_timeout ({:?})",
                self.default_timeout, self.min_timeout
            ));
        }
        Ok(())
    }
}

/// OS cache directory for the application
///
/// - macOS: ~/Library/Caches/depot-transfer
/// - Linux: ~/.cache/depot-transfer
/// - Windows: %LOCALAPPDATA%/depot-transfer
pub fn default_cache_dir() -> CacheResult<PathBuf> {
    Ok(dirs::cache_dir()
        .ok_or_else(|| CacheError::DirectoryNotAccessible {
            path: PathBuf::from("system cache directory"),
        })?
        .join(cache::APP_DIR_NAME))
}
