//! Worker pool statistics and retry backoff

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live counters updated by pool tasks
#[derive(Debug, Default)]
pub struct PoolCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    active: AtomicUsize,
}

impl PoolCounters {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self, success: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time snapshot
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Jobs handed to the pool
    pub submitted: u64,
    /// Jobs that returned `Ok`
    pub completed: u64,
    /// Jobs that returned an error
    pub failed: u64,
    /// Jobs currently holding a worker slot
    pub active: usize,
}

impl PoolStats {
    /// Jobs submitted but not yet finished
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted, {} completed, {} failed, {} active",
            self.submitted, self.completed, self.failed, self.active
        )
    }
}

/// Backoff calculation utilities
pub struct BackoffCalculator;

impl BackoffCalculator {
    /// Exponential delay for retry round `attempt` with symmetric jitter
    pub fn calculate_retry_delay(
        attempt: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_percentage: f64,
    ) -> Duration {
        let base_millis = base_delay.as_millis() as u64;
        let exponential = base_millis.saturating_mul(1u64 << attempt.min(16));
        let capped = exponential.min(max_delay.as_millis() as u64);

        // Add jitter to prevent thundering herd
        let jitter_range = (capped as f64 * jitter_percentage) as u64;
        let jitter = if jitter_range > 0 {
            fastrand::u64(0..=jitter_range * 2) as i64 - jitter_range as i64
        } else {
            0
        };

        Duration::from_millis((capped as i64 + jitter).max(0) as u64)
    }
}
