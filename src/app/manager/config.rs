//! Transfer manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::transfer;
use crate::errors::{ConfigError, ConfigResult};

/// Settings for request orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Network wait budget for locations without a connection timeout
    pub default_timeout: Duration,
    /// Persist fresh remote listings as a sidecar when the location allows storing
    pub store_listings: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: transfer::DEFAULT_TIMEOUT,
            store_listings: true,
        }
    }
}

impl ManagerConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_store_listings(mut self, enabled: bool) -> Self {
        self.store_listings = enabled;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "transfer.default_timeout".to_string(),
                value: format!("{:?}", self.default_timeout),
                reason: "Timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
