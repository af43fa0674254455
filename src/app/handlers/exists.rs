//! Remote existence handler

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::join::{settle, wait_for, JoinRegistry};
use crate::app::nfc::NotFoundCache;
use crate::app::resource::ConcreteResource;
use crate::app::transport::Transport;
use crate::app::worker::WorkerPool;
use crate::errors::TransferResult;

/// Checks remote existence, one network job per resource
#[derive(Debug)]
pub struct ExistsHandler {
    pool: WorkerPool,
    nfc: Arc<dyn NotFoundCache>,
    joins: JoinRegistry<bool>,
}

impl ExistsHandler {
    pub fn new(pool: WorkerPool, nfc: Arc<dyn NotFoundCache>) -> Self {
        Self {
            pool,
            nfc,
            joins: JoinRegistry::new("exists"),
        }
    }

    pub async fn exists(
        &self,
        resource: &ConcreteResource,
        timeout: Duration,
        transport: Arc<dyn Transport>,
        suppress_failures: bool,
    ) -> TransferResult<bool> {
        if self.nfc.is_missing(resource) {
            debug!("{} recorded missing", resource);
            return Ok(false);
        }

        let key = resource.to_string();
        let url = resource.url();
        let (job, _) = self.joins.join_or_submit(&key, || {
            let job = transport.create_existence_job(&url, resource, timeout);
            self.pool.submit_job(key.clone(), job)
        });

        let outcome = wait_for(&key, job, timeout).await;
        match &outcome {
            Ok(false) => self.nfc.add_missing(resource),
            Err(e) if !e.is_retryable() => self.nfc.add_missing(resource),
            _ => {}
        }
        settle(outcome, suppress_failures, false)
    }
}
