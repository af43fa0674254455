//! Application constants for Depot Transfer
//!
//! This module centralizes all constants used throughout the engine,
//! organized by functional domain.

use std::time::Duration;

/// HTTP transport configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Depot-Transfer/0.1.0";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 25;

    /// Default rate limit for outbound requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 50;
}

/// Transfer orchestration constants
pub mod transfer {
    use super::Duration;

    /// Default timeout for a single network-bound wait
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Polling interval while waiting on a batch round
    pub const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Base delay before a batch round that retries failed candidates
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

    /// Cap for the batch retry delay
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

    /// Jitter applied to batch retry delays (0.0-1.0)
    pub const RETRY_JITTER: f64 = 0.1;
}

/// Reserved file names and suffixes
pub mod files {
    /// Directory listing sidecar written next to cached directory contents
    pub const LISTING_FILE_NAME: &str = ".listing.txt";

    /// Names that never appear in a directory listing
    pub const RESERVED_NAMES: &[&str] = &[LISTING_FILE_NAME];

    /// Suffix appended to a directory entry in listings
    pub const DIRECTORY_MARKER: &str = "/";

    /// Suffix of a file renamed aside before expiry deletion
    pub const EXPIRED_SUFFIX: &str = ".to-delete";

    /// Suffix of MD5 checksum sidecars
    pub const MD5_SUFFIX: &str = ".md5";

    /// Read buffer size for streaming (64KB)
    pub const CHUNK_SIZE: usize = 64 * 1024;
}

/// Cache storage constants
pub mod cache {
    use super::Duration;

    /// Default file-age timeout for cached content
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

    /// Minimum timeout any location may configure
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(60);

    /// How long lock waits may block before failing
    pub const LOCK_TIMEOUT: Duration = Duration::from_secs(60);

    /// Application directory name under the OS cache/config dir
    pub const APP_DIR_NAME: &str = "depot-transfer";
}

/// Path-mapped store constants
pub mod mapped {
    use super::Duration;

    /// Grace period between logical delete and physical reclaim
    pub const GC_GRACE_PERIOD: Duration = Duration::from_secs(60 * 60);

    /// Interval between periodic reclaim sweeps
    pub const GC_INTERVAL: Duration = Duration::from_secs(10 * 60);

    /// Database file name inside the store root
    pub const DATABASE_FILE_NAME: &str = "pathdb.sqlite";

    /// Blob directory name inside the store root
    pub const BLOB_DIR_NAME: &str = "blobs";
}

/// Not-found cache constants
pub mod nfc {
    use super::Duration;

    /// Default time a resource stays marked missing
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
}

/// Worker pool constants
pub mod workers {
    use super::Duration;

    /// Default number of concurrently running transfer jobs
    pub const DEFAULT_WORKER_COUNT: usize = 8;

    /// Maximum allowed concurrent jobs
    pub const MAX_WORKER_COUNT: usize = 256;

    /// Maximum retry attempts per batch resource on retryable errors
    pub const MAX_RETRIES: u32 = 3;

    /// Default timeout for a single job
    pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "warn";
}

pub use files::{LISTING_FILE_NAME, RESERVED_NAMES};
pub use http::USER_AGENT;
pub use workers::DEFAULT_WORKER_COUNT;
