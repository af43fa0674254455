//! Concurrent batch retrieval
//!
//! Each requested resource gets a retrier holding its candidate list and a
//! cursor. Rounds run every active retrier on the batch pool at once and
//! wait for all of them. After a round a retrier either found content, hit a
//! hard error, ran out of candidates, or stays active: a missing candidate
//! or a location error moves the cursor forward, a retryable error repeats
//! the same candidate while the retry budget lasts.

use std::collections::HashMap;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::app::resource::{ConcreteResource, Resource};
use crate::app::transfer::Transfer;
use crate::app::worker::{flatten_join, BackoffCalculator};
use crate::errors::{TransferError, TransferResult};

use super::TransferManager;

/// Working set of a batch retrieval
#[derive(Debug, Default)]
pub struct TransferBatch {
    resources: Vec<Resource>,
    transfers: HashMap<Resource, Transfer>,
    errors: HashMap<Resource, TransferError>,
}

impl TransferBatch {
    /// Batch over `resources`, dropping duplicates
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        let mut unique: Vec<Resource> = Vec::new();
        for resource in resources {
            if !unique.contains(&resource) {
                unique.push(resource);
            }
        }
        Self {
            resources: unique,
            ..Default::default()
        }
    }

    /// Requested resources
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Resolved transfers keyed by the requested resource
    pub fn transfers(&self) -> &HashMap<Resource, Transfer> {
        &self.transfers
    }

    /// Hard failures keyed by the requested resource
    pub fn errors(&self) -> &HashMap<Resource, TransferError> {
        &self.errors
    }

    pub fn transfer(&self, resource: &Resource) -> Option<&Transfer> {
        self.transfers.get(resource)
    }

    pub fn error(&self, resource: &Resource) -> Option<&TransferError> {
        self.errors.get(resource)
    }

    /// Requested resources that were neither found nor failed
    pub fn missing(&self) -> Vec<&Resource> {
        self.resources
            .iter()
            .filter(|r| !self.transfers.contains_key(r) && !self.errors.contains_key(r))
            .collect()
    }
}

/// One requested resource walking its candidates
#[derive(Debug)]
struct Retrier {
    resource: Resource,
    candidates: Vec<ConcreteResource>,
    cursor: usize,
    retries: u32,
}

impl Retrier {
    fn new(resource: Resource) -> Self {
        Self {
            candidates: resource.candidates(),
            resource,
            cursor: 0,
            retries: 0,
        }
    }

    fn current(&self) -> Option<&ConcreteResource> {
        self.candidates.get(self.cursor)
    }

    /// Move to the next candidate; false once the list is exhausted
    fn advance(&mut self) -> bool {
        self.cursor += 1;
        self.retries = 0;
        self.cursor < self.candidates.len()
    }
}

impl TransferManager {
    /// Retrieve many resources concurrently
    ///
    /// Never fails as a whole: each resource ends up resolved, recorded as a
    /// hard failure, or silently absent.
    pub async fn batch_retrieve(&self, resources: impl IntoIterator<Item = Resource>) -> TransferBatch {
        let mut batch = TransferBatch::new(resources);
        let mut active: Vec<Retrier> = batch
            .resources
            .iter()
            .cloned()
            .map(Retrier::new)
            .filter(|retrier| !retrier.candidates.is_empty())
            .collect();

        let pool_config = self.inner.batch_pool.config().clone();
        let mut round: u32 = 0;
        let mut retrying = false;

        while !active.is_empty() {
            if retrying {
                let delay = BackoffCalculator::calculate_retry_delay(
                    round.saturating_sub(1),
                    pool_config.retry_base_delay,
                    pool_config.retry_max_delay,
                    pool_config.backoff_jitter_percentage,
                );
                debug!("Batch round {} waits {:?} before retrying", round, delay);
                tokio::time::sleep(delay).await;
            }
            round += 1;
            retrying = false;

            let outcomes = self.run_round(round, std::mem::take(&mut active)).await;
            for (mut retrier, outcome) in outcomes {
                match outcome {
                    Ok(Some(transfer)) => {
                        debug!("Batch resolved {} via {}", retrier.resource, transfer);
                        batch.transfers.insert(retrier.resource, transfer);
                    }
                    Ok(None) => {
                        if retrier.advance() {
                            active.push(retrier);
                        } else {
                            debug!("No candidate of {} has content", retrier.resource);
                        }
                    }
                    Err(e) if e.is_location_error() => {
                        debug!("Location error for {}: {}", retrier.resource, e);
                        if retrier.advance() {
                            active.push(retrier);
                        }
                    }
                    Err(e) if e.is_retryable() && retrier.retries < pool_config.max_retries => {
                        retrier.retries += 1;
                        debug!(
                            "Retrying {} (attempt {}): {}",
                            retrier.resource, retrier.retries, e
                        );
                        retrying = true;
                        active.push(retrier);
                    }
                    Err(e) => {
                        warn!("Batch retrieval of {} failed: {}", retrier.resource, e);
                        batch.errors.insert(retrier.resource, e);
                    }
                }
            }
        }

        info!(
            "Batch finished after {} rounds: {} retrieved, {} failed, {} missing",
            round,
            batch.transfers.len(),
            batch.errors.len(),
            batch.missing().len()
        );
        batch
    }

    /// Run every retrier's current candidate and wait for all of them
    async fn run_round(
        &self,
        round: u32,
        retriers: Vec<Retrier>,
    ) -> Vec<(Retrier, TransferResult<Option<Transfer>>)> {
        let total = retriers.len();
        let poll_interval = self.inner.batch_pool.config().batch_poll_interval;

        let mut running: FuturesUnordered<_> = retriers
            .into_iter()
            .filter_map(|retrier| {
                let candidate = retrier.current()?.clone();
                let label = candidate.to_string();
                let manager = self.clone();
                let handle = self
                    .inner
                    .batch_pool
                    .submit(label.clone(), async move { manager.retrieve(&candidate, false).await });
                Some(async move { (retrier, flatten_join(&label, handle.await)) })
            })
            .collect();

        let mut finished = Vec::with_capacity(total);
        while !running.is_empty() {
            match tokio::time::timeout(poll_interval, running.next()).await {
                Ok(Some(done)) => finished.push(done),
                Ok(None) => break,
                Err(_) => warn!(
                    "Batch round {}: {} of {} retrievals still running",
                    round,
                    running.len(),
                    total
                ),
            }
        }
        finished
    }
}
