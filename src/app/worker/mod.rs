//! Bounded worker pool for network jobs and batch retriers
//!
//! - [`config`] - Pool configuration, builder and presets
//! - [`pool`] - Semaphore-bounded task pool
//! - [`stats`] - Activity counters and retry backoff

pub mod config;
pub mod pool;
pub mod stats;

pub use config::{ConfigPresets, PoolConfig, PoolConfigBuilder};
pub use pool::{flatten_join, WorkerPool};
pub use stats::{BackoffCalculator, PoolStats};
