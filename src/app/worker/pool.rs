//! Bounded worker pool
//!
//! Every job runs on its own tokio task but must hold one of `worker_count`
//! semaphore permits while it works. Tasks are detached from their callers:
//! a caller that stops waiting does not cancel the job.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::config::PoolConfig;
use super::stats::{PoolCounters, PoolStats};
use crate::app::transport::TransportJob;
use crate::errors::{ConfigResult, TransferError, TransferResult};

/// Pool shared by the handlers and batch retrieval
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    counters: PoolCounters,
}

/// Marks a job active for as long as it is alive
struct ActiveJob {
    inner: Arc<PoolInner>,
    success: bool,
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.inner.counters.record_finished(self.success);
    }
}

impl WorkerPool {
    /// Create a pool after validating `config`
    pub fn new(config: PoolConfig) -> ConfigResult<Self> {
        config.validate()?;
        info!("Starting worker pool with {} workers", config.worker_count);
        Ok(Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(config.worker_count)),
                counters: PoolCounters::default(),
                config,
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Schedule `work`; it starts once a worker slot is free
    pub fn submit<T, F>(&self, label: impl Into<String>, work: F) -> JoinHandle<TransferResult<T>>
    where
        T: Send + 'static,
        F: Future<Output = TransferResult<T>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let label = label.into();
        inner.counters.record_submitted();

        tokio::spawn(async move {
            let _permit = inner
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| TransferError::Interrupted { url: label.clone() })?;

            inner.counters.record_started();
            let mut active = ActiveJob {
                inner: inner.clone(),
                success: false,
            };
            trace!("Running job {}", label);
            let budget = inner.config.job_timeout;
            let result = match tokio::time::timeout(budget, work).await {
                Ok(result) => result,
                Err(_) => Err(TransferError::Timeout {
                    url: label.clone(),
                    seconds: budget.as_secs(),
                }),
            };
            active.success = result.is_ok();
            result
        })
    }

    /// Schedule a transport job
    pub fn submit_job<T>(
        &self,
        label: impl Into<String>,
        job: Box<dyn TransportJob<T>>,
    ) -> JoinHandle<TransferResult<T>>
    where
        T: Send + 'static,
    {
        self.submit(label, job.call())
    }

    /// Run `work` on the pool and wait for it
    pub async fn execute<T, F>(&self, label: impl Into<String>, work: F) -> TransferResult<T>
    where
        T: Send + 'static,
        F: Future<Output = TransferResult<T>> + Send + 'static,
    {
        let label = label.into();
        let handle = self.submit(label.clone(), work);
        flatten_join(&label, handle.await)
    }

    /// Activity snapshot
    pub fn stats(&self) -> PoolStats {
        self.inner.counters.snapshot()
    }

    /// Free worker slots
    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Refuse new work; jobs waiting for a slot fail with `Interrupted`
    pub fn shutdown(&self) {
        debug!("Shutting down worker pool ({})", self.stats());
        self.inner.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.permits.is_closed()
    }
}

/// Collapse a task join result into a transfer result
pub fn flatten_join<T>(
    label: &str,
    joined: Result<TransferResult<T>, tokio::task::JoinError>,
) -> TransferResult<T> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(TransferError::Interrupted {
            url: label.to_string(),
        }),
        Err(e) => Err(TransferError::transfer(label, format!("job panicked: {}", e))),
    }
}
