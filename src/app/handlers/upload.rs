//! Upload handler

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::join::{settle, wait_for, JoinRegistry};
use crate::app::nfc::NotFoundCache;
use crate::app::resource::ConcreteResource;
use crate::app::transfer::Transfer;
use crate::app::transport::Transport;
use crate::app::worker::WorkerPool;
use crate::errors::TransferResult;

/// Publishes cached content to the remote, one network job per URL
#[derive(Debug)]
pub struct UploadHandler {
    pool: WorkerPool,
    nfc: Arc<dyn NotFoundCache>,
    joins: JoinRegistry<bool>,
}

impl UploadHandler {
    pub fn new(pool: WorkerPool, nfc: Arc<dyn NotFoundCache>) -> Self {
        Self {
            pool,
            nfc,
            joins: JoinRegistry::new("upload"),
        }
    }

    /// Upload the content of `source` to `resource`
    ///
    /// A successful upload clears any not-found record for the resource.
    pub async fn upload(
        &self,
        resource: &ConcreteResource,
        source: Transfer,
        timeout: Duration,
        transport: Arc<dyn Transport>,
        suppress_failures: bool,
    ) -> TransferResult<bool> {
        let url = resource.url();
        let (job, joined) = self.joins.join_or_submit(&url, || {
            let job = transport.create_publish_job(&url, resource, source.clone(), timeout);
            self.pool.submit_job(url.clone(), job)
        });
        if joined {
            debug!("Joined in-flight upload of {}", url);
        }

        let outcome = wait_for(&url, job, timeout).await;
        if let Ok(true) = outcome {
            self.nfc.clear_missing(resource);
            info!("Published {}", resource);
        }
        settle(outcome, suppress_failures, false)
    }
}
