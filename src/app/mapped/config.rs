//! Path-mapped store configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::cache::config::default_cache_dir;
use crate::constants::{cache, mapped};
use crate::errors::CacheResult;

/// Configuration for the path-mapped content store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathMappedConfig {
    /// Store root; the database and blob directory default to live below it
    pub root: Option<PathBuf>,
    /// Explicit database file, overriding `<root>/pathdb.sqlite`
    pub database: Option<PathBuf>,
    /// Explicit blob directory, overriding `<root>/blobs`
    pub blob_dir: Option<PathBuf>,
    /// Time an unreferenced blob survives before reclaim may delete it
    pub gc_grace_period: Duration,
    /// Interval between background reclaim sweeps
    pub gc_interval: Duration,
    /// Age after which entries expire unless the location overrides it
    pub default_timeout: Duration,
    /// Lower bound applied to every location's timeout
    pub min_timeout: Duration,
}

impl Default for PathMappedConfig {
    fn default() -> Self {
        Self {
            root: None,
            database: None,
            blob_dir: None,
            gc_grace_period: mapped::GC_GRACE_PERIOD,
            gc_interval: mapped::GC_INTERVAL,
            default_timeout: cache::DEFAULT_TIMEOUT,
            min_timeout: cache::MIN_TIMEOUT,
        }
    }
}

impl PathMappedConfig {
    /// Create a configuration with everything stored below `root`
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root: Some(root),
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: PathBuf) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_blob_dir(mut self, blob_dir: PathBuf) -> Self {
        self.blob_dir = Some(blob_dir);
        self
    }

    pub fn with_gc_grace_period(mut self, grace: Duration) -> Self {
        self.gc_grace_period = grace;
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_min_timeout(mut self, timeout: Duration) -> Self {
        self.min_timeout = timeout;
        self
    }

    fn resolve_root(&self) -> CacheResult<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(default_cache_dir()?.join("mapped")),
        }
    }

    /// Database file location
    pub fn database_path(&self) -> CacheResult<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(self.resolve_root()?.join(mapped::DATABASE_FILE_NAME)),
        }
    }

    /// Blob directory location
    pub fn blob_path(&self) -> CacheResult<PathBuf> {
        match &self.blob_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(self.resolve_root()?.join(mapped::BLOB_DIR_NAME)),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.gc_interval.is_zero() {
            return Err("gc_interval must be greater than 0".to_string());
        }
        if self.default_timeout < self.min_timeout {
            return Err(format!(
                "default_timeout ({:?}) must not be below min_timeout ({:?})",
                self.default_timeout, self.min_timeout
            ));
        }
        if let Some(database) = &self.database {
            if database.is_dir() {
                return Err(format!("database {} is a directory", display(database)));
            }
        }
        Ok(())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
