//! Worker pool configuration management
//!
//! Configuration and validation for the bounded pool that runs every
//! network job and every batch retrier.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{transfer, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the worker pool and batch retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of jobs allowed to run concurrently
    pub worker_count: usize,
    /// Extra attempts a batch retrier gets on a retryable error
    pub max_retries: u32,
    /// Base delay before a batch round that retries failed candidates
    pub retry_base_delay: Duration,
    /// Maximum retry delay (backoff cap)
    pub retry_max_delay: Duration,
    /// Jitter percentage for backoff randomization
    pub backoff_jitter_percentage: f64,
    /// Budget for a single job when the caller does not give one
    pub job_timeout: Duration,
    /// How often a batch round reports stragglers while waiting
    pub batch_poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_retries: workers::MAX_RETRIES,
            retry_base_delay: transfer::RETRY_BASE_DELAY,
            retry_max_delay: transfer::RETRY_MAX_DELAY,
            backoff_jitter_percentage: transfer::RETRY_JITTER,
            job_timeout: workers::DEFAULT_JOB_TIMEOUT,
            batch_poll_interval: transfer::BATCH_POLL_INTERVAL,
        }
    }
}

impl PoolConfig {
    fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            field: format!("pool.{}", field),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(Self::invalid(
                "worker_count",
                self.worker_count,
                "Worker count cannot be zero",
            ));
        }

        if self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(Self::invalid(
                "worker_count",
                self.worker_count,
                &format!("Worker count exceeds maximum ({})", workers::MAX_WORKER_COUNT),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(Self::invalid(
                "retry_base_delay",
                format!("{:?}", self.retry_base_delay),
                "Retry base delay must not exceed max delay",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff_jitter_percentage) {
            return Err(Self::invalid(
                "backoff_jitter_percentage",
                self.backoff_jitter_percentage,
                "Backoff jitter percentage must be between 0.0 and 1.0",
            ));
        }

        if self.job_timeout.is_zero() || self.batch_poll_interval.is_zero() {
            return Err(Self::invalid(
                "job_timeout",
                format!("{:?}", self.job_timeout),
                "Timeouts must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Builder for PoolConfig following the established pattern
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the number of concurrent jobs
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Set the batch retry budget
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set retry delay configuration
    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry_base_delay = base;
        self.config.retry_max_delay = max;
        self
    }

    /// Set backoff jitter percentage
    pub fn backoff_jitter(mut self, percentage: f64) -> Self {
        self.config.backoff_jitter_percentage = percentage;
        self
    }

    /// Set the default job timeout
    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    /// Set the batch straggler polling interval
    pub fn batch_poll_interval(mut self, interval: Duration) -> Self {
        self.config.batch_poll_interval = interval;
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> ConfigResult<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Predefined configurations for common scenarios
pub struct ConfigPresets;

impl ConfigPresets {
    /// Small pool with short delays for tests
    pub fn testing() -> PoolConfig {
        PoolConfig {
            worker_count: 4,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(10),
            backoff_jitter_percentage: 0.0,
            job_timeout: Duration::from_secs(10),
            batch_poll_interval: Duration::from_millis(200),
        }
    }

    /// Wider pool for proxies serving many clients
    pub fn production() -> PoolConfig {
        PoolConfig {
            worker_count: 32,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(ConfigPresets::testing().validate().is_ok());
        assert!(ConfigPresets::production().validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        let config = PoolConfigBuilder::new()
            .worker_count(2)
            .max_retries(5)
            .build()
            .unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_retries, 5);

        assert!(PoolConfigBuilder::new().worker_count(0).build().is_err());
        assert!(PoolConfigBuilder::new()
            .worker_count(workers::MAX_WORKER_COUNT + 1)
            .build()
            .is_err());
        assert!(PoolConfigBuilder::new().backoff_jitter(1.5).build().is_err());
        assert!(PoolConfigBuilder::new()
            .retry_delays(Duration::from_secs(5), Duration::from_secs(1))
            .build()
            .is_err());
    }
}
