//! Download handler

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::join::{settle, wait_for, JoinRegistry};
use crate::app::nfc::NotFoundCache;
use crate::app::resource::ConcreteResource;
use crate::app::transfer::Transfer;
use crate::app::transport::Transport;
use crate::app::worker::WorkerPool;
use crate::errors::TransferResult;

/// Fetches remote content into the cache, one network job per URL
#[derive(Debug)]
pub struct DownloadHandler {
    pool: WorkerPool,
    nfc: Arc<dyn NotFoundCache>,
    joins: JoinRegistry<Option<Transfer>>,
}

impl DownloadHandler {
    pub fn new(pool: WorkerPool, nfc: Arc<dyn NotFoundCache>) -> Self {
        Self {
            pool,
            nfc,
            joins: JoinRegistry::new("download"),
        }
    }

    /// Download `resource` into `target`
    ///
    /// Returns the transfer holding the content, or `None` when the remote
    /// has nothing (or the resource is recorded missing). An existing target
    /// is returned without touching the network. Concurrent calls for the
    /// same URL share one job.
    pub async fn download(
        &self,
        resource: &ConcreteResource,
        target: Transfer,
        timeout: Duration,
        transport: Arc<dyn Transport>,
        suppress_failures: bool,
    ) -> TransferResult<Option<Transfer>> {
        if target.exists().await? {
            debug!("{} already cached", target);
            return Ok(Some(target));
        }
        if self.nfc.is_missing(resource) {
            debug!("{} recorded missing, skipping download", resource);
            return Ok(None);
        }

        let url = resource.url();
        let (job, joined) = self.joins.join_or_submit(&url, || {
            let job = transport.create_download_job(&url, resource, target.clone(), timeout);
            self.pool.submit_job(url.clone(), job)
        });
        if joined {
            debug!("Joined in-flight download of {}", url);
        }

        let outcome = match wait_for(&url, job, timeout).await {
            Ok(Some(transfer)) => {
                if transfer.exists().await? {
                    Ok(Some(transfer))
                } else {
                    self.nfc.add_missing(resource);
                    Ok(None)
                }
            }
            Ok(None) => {
                self.nfc.add_missing(resource);
                Ok(None)
            }
            Err(e) => {
                if !e.is_retryable() {
                    self.nfc.add_missing(resource);
                }
                Err(e)
            }
        };
        settle(outcome, suppress_failures, None)
    }

    /// Downloads currently in flight
    pub fn pending(&self) -> usize {
        self.joins.pending_count()
    }
}
