//! In-flight job registry
//!
//! Maps a dedup key to the shared future of the job currently serving it.
//! Lookup and registration happen under one lock, so two callers racing on
//! the same key can never both submit. The shared future is driven by its own
//! task, which removes the registration when the job completes (success or
//! failure); callers that give up waiting do not cancel it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::app::worker::flatten_join;
use crate::errors::{TransferError, TransferResult};

/// Output of a job shared between every caller joined to it
pub type SharedOutcome<T> = Result<T, Arc<TransferError>>;

/// Future every joined caller awaits
pub type SharedJob<T> = Shared<BoxFuture<'static, SharedOutcome<T>>>;

type PendingMap<T> = Arc<Mutex<HashMap<String, SharedJob<T>>>>;

/// Registry of in-flight jobs keyed by dedup key
pub struct JoinRegistry<T: Clone + Send + Sync + 'static> {
    name: &'static str,
    pending: PendingMap<T>,
}

impl<T: Clone + Send + Sync + 'static> JoinRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach to the job pending under `key`, or start one with `submit`
    ///
    /// Returns the shared job and whether it was joined rather than started.
    pub fn join_or_submit<F>(&self, key: &str, submit: F) -> (SharedJob<T>, bool)
    where
        F: FnOnce() -> JoinHandle<TransferResult<T>>,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(key) {
            trace!("{}: joining pending job for {}", self.name, key);
            return (existing.clone(), true);
        }

        let handle = submit();
        let registry = self.pending.clone();
        let owned_key = key.to_string();
        let job: SharedJob<T> = async move {
            let outcome = flatten_join(&owned_key, handle.await).map_err(Arc::new);
            registry.lock().remove(&owned_key);
            outcome
        }
        .boxed()
        .shared();

        pending.insert(key.to_string(), job.clone());
        tokio::spawn(job.clone().map(|_| ()));
        (job, false)
    }

    /// Whether a job is currently registered for `key`
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for JoinRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinRegistry")
            .field("name", &self.name)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Wait up to `timeout` for a shared job
pub async fn wait_for<T: Clone>(key: &str, job: SharedJob<T>, timeout: Duration) -> TransferResult<T> {
    match tokio::time::timeout(timeout, job).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(shared)) => Err(TransferError::from_shared(key, &shared)),
        Err(_) => Err(TransferError::Timeout {
            url: key.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

/// Apply the caller's failure policy to an outcome
pub fn settle<T>(result: TransferResult<T>, suppress_failures: bool, fallback: T) -> TransferResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if suppress_failures => {
            tracing::debug!("Suppressed failure: {}", e);
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}
