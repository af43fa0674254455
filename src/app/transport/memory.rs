//! In-memory transport for `mem://` locations
//!
//! Holds remote content in a map keyed by URL. Every call is counted and
//! failures can be injected per URL, which makes it the transport of choice
//! for exercising fallback, join and batch behaviour without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::{ListingResult, Transport, TransportJob};
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::Transfer;
use crate::constants::files::DIRECTORY_MARKER;
use crate::errors::{TransferError, TransferResult};

/// Failure injected for a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The whole location is unreachable
    Location,
    /// The request times out
    Timeout,
    /// The remote answers 502
    BadGateway,
    /// The job is cancelled before it completes
    Interrupted,
    /// A resource-specific hard failure
    Hard,
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    mode: FailureMode,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, Failure>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

/// Transport serving content from memory
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

struct FutureJob<T>(BoxFuture<'static, TransferResult<T>>);

#[async_trait]
impl<T: Send + 'static> TransportJob<T> for FutureJob<T> {
    async fn call(self: Box<Self>) -> TransferResult<T> {
        self.0.await
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every job by `delay` before it does anything
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock() = delay;
        self
    }

    /// Store content at `resource`
    pub fn put(&self, resource: &ConcreteResource, content: impl Into<Vec<u8>>) {
        self.inner.files.lock().insert(resource.url(), content.into());
    }

    /// Remove content at `resource`
    pub fn remove(&self, resource: &ConcreteResource) {
        self.inner.files.lock().remove(&resource.url());
    }

    /// Content currently held at `resource`
    pub fn get(&self, resource: &ConcreteResource) -> Option<Vec<u8>> {
        self.inner.files.lock().get(&resource.url()).cloned()
    }

    /// Fail every call for `resource` with `mode`
    pub fn fail(&self, resource: &ConcreteResource, mode: FailureMode) {
        self.inner.failures.lock().insert(
            resource.url(),
            Failure {
                mode,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` calls for `resource` with `mode`
    pub fn fail_times(&self, resource: &ConcreteResource, mode: FailureMode, times: u32) {
        self.inner.failures.lock().insert(
            resource.url(),
            Failure {
                mode,
                remaining: Some(times),
            },
        );
    }

    /// Calls of kind `kind` (`download`, `list`, `exists`, `publish`) made for `resource`
    pub fn calls(&self, kind: &str, resource: &ConcreteResource) -> usize {
        self.inner
            .calls
            .lock()
            .get(&format!("{} {}", kind, resource.url()))
            .copied()
            .unwrap_or(0)
    }

    /// Calls of kind `kind` across all URLs
    pub fn total_calls(&self, kind: &str) -> usize {
        let prefix = format!("{} ", kind);
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, count)| *count)
            .sum()
    }
}

impl MemoryInner {
    /// Count the call, sleep for the configured delay and apply injected failures
    async fn enter(&self, kind: &str, url: &str, resource: &ConcreteResource) -> TransferResult<()> {
        *self
            .calls
            .lock()
            .entry(format!("{} {}", kind, url))
            .or_insert(0) += 1;

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mode = {
            let mut failures = self.failures.lock();
            match failures.get_mut(url) {
                Some(failure) => match failure.remaining {
                    None => Some(failure.mode),
                    Some(0) => {
                        failures.remove(url);
                        None
                    }
                    Some(n) => {
                        failure.remaining = Some(n - 1);
                        Some(failure.mode)
                    }
                },
                None => None,
            }
        };

        match mode {
            None => Ok(()),
            Some(FailureMode::Location) => Err(TransferError::location(
                resource.location().name(),
                "simulated outage",
            )),
            Some(FailureMode::Timeout) => Err(TransferError::Timeout {
                url: url.to_string(),
                seconds: 0,
            }),
            Some(FailureMode::BadGateway) => Err(TransferError::BadGateway {
                url: url.to_string(),
                status: 502,
                message: "Bad Gateway".to_string(),
            }),
            Some(FailureMode::Interrupted) => Err(TransferError::Interrupted {
                url: url.to_string(),
            }),
            Some(FailureMode::Hard) => Err(TransferError::transfer(resource, "simulated failure")),
        }
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn handles(&self, location: &Location) -> bool {
        location.scheme() == Some("mem")
    }

    fn create_download_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        target: Transfer,
        _timeout: Duration,
    ) -> Box<dyn TransportJob<Option<Transfer>>> {
        let inner = self.inner.clone();
        let url = url.to_string();
        let resource = resource.clone();
        Box::new(FutureJob(
            async move {
                inner.enter("download", &url, &resource).await?;
                let content = inner.files.lock().get(&url).cloned();
                match content {
                    Some(bytes) => {
                        target.write_bytes(&bytes).await?;
                        Ok(Some(target))
                    }
                    None => Ok(None),
                }
            }
            .boxed(),
        ))
    }

    fn create_listing_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        _timeout: Duration,
    ) -> Box<dyn TransportJob<Option<ListingResult>>> {
        let inner = self.inner.clone();
        let url = url.to_string();
        let resource = resource.clone();
        Box::new(FutureJob(
            async move {
                inner.enter("list", &url, &resource).await?;
                let prefix = format!("{}/", url.trim_end_matches('/'));
                let mut entries: Vec<String> = Vec::new();
                for key in inner.files.lock().keys() {
                    let Some(rest) = key.strip_prefix(&prefix) else {
                        continue;
                    };
                    let entry = match rest.split_once('/') {
                        Some((dir, _)) => format!("{}{}", dir, DIRECTORY_MARKER),
                        None => rest.to_string(),
                    };
                    if !entry.is_empty() && !entries.contains(&entry) {
                        entries.push(entry);
                    }
                }
                if entries.is_empty() {
                    Ok(None)
                } else {
                    entries.sort();
                    Ok(Some(ListingResult::new(resource, entries)))
                }
            }
            .boxed(),
        ))
    }

    fn create_existence_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        _timeout: Duration,
    ) -> Box<dyn TransportJob<bool>> {
        let inner = self.inner.clone();
        let url = url.to_string();
        let resource = resource.clone();
        Box::new(FutureJob(
            async move {
                inner.enter("exists", &url, &resource).await?;
                let prefix = format!("{}/", url.trim_end_matches('/'));
                let files = inner.files.lock();
                Ok(files.contains_key(&url) || files.keys().any(|k| k.starts_with(&prefix)))
            }
            .boxed(),
        ))
    }

    fn create_publish_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        source: Transfer,
        _timeout: Duration,
    ) -> Box<dyn TransportJob<bool>> {
        let inner = self.inner.clone();
        let url = url.to_string();
        let resource = resource.clone();
        Box::new(FutureJob(
            async move {
                inner.enter("publish", &url, &resource).await?;
                let content = source.read_to_vec().await?;
                inner.files.lock().insert(url, content);
                Ok(true)
            }
            .boxed(),
        ))
    }
}
