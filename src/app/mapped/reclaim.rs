//! Deferred physical deletion of unreferenced blobs
//!
//! Deleting the last path that references a content id only queues the blob.
//! A sweep deletes queued blobs whose grace period has passed, and removes
//! the reclaim record only once the blob is really gone so that failures are
//! retried by the next sweep.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::CacheResult;

use super::provider::PathMappedCache;

/// Outcome of one reclaim sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Reclaim records past their grace period
    pub examined: usize,
    /// Blobs deleted and records removed
    pub reclaimed: usize,
    /// Blobs whose deletion failed; their records stay queued
    pub failed: usize,
}

impl fmt::Display for GcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} examined, {} reclaimed, {} failed",
            self.examined, self.reclaimed, self.failed
        )
    }
}

impl PathMappedCache {
    /// Reclaim every blob queued at or before `cutoff`
    pub async fn gc(&self, cutoff: DateTime<Utc>) -> CacheResult<GcReport> {
        let candidates = self
            .with_db(move |db| db.reclaim_candidates(cutoff))
            .await?;
        let mut report = GcReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            if let Err(e) = self.blobs().delete(&candidate.storage_pointer).await {
                warn!(
                    "Failed to delete blob {} for content {}: {}",
                    candidate.storage_pointer, candidate.content_id, e
                );
                report.failed += 1;
                continue;
            }
            let content_id = candidate.content_id;
            match self.with_db(move |db| db.complete_reclaim(&content_id)).await {
                Ok(()) => report.reclaimed += 1,
                Err(e) => {
                    warn!("Failed to clear reclaim of {}: {}", candidate.content_id, e);
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!("Reclaim sweep: {}", report);
        }
        Ok(report)
    }

    /// Reclaim everything whose configured grace period has elapsed
    pub async fn gc_expired(&self) -> CacheResult<GcReport> {
        let grace = chrono::Duration::from_std(self.config().gc_grace_period)
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.gc(Utc::now() - grace).await
    }
}

/// Background task running periodic reclaim sweeps
#[derive(Debug)]
pub struct Reclaimer {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Reclaimer {
    /// Start sweeping `store` every `interval`
    pub fn spawn(store: PathMappedCache, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.gc_expired().await {
                            warn!("Reclaim sweep failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Reclaimer received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, task }
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!("Reclaimer task ended abnormally: {}", e);
        }
    }
}
