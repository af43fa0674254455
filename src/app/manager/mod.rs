//! Transfer manager: top-level request orchestration
//!
//! The manager resolves resources against the cache first and falls back to
//! the remote through the operation handlers. Virtual resources are resolved
//! candidate by candidate in precedence order; batches resolve many
//! resources concurrently with per-resource fallback and retry.
//!
//! # Module Organization
//!
//! - [`config`] - Manager configuration
//! - [`listing`] - Directory listing merge
//! - [`batch`] - Concurrent batch retrieval
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depot_transfer::app::cache::{FileCache, FileCacheConfig};
//! use depot_transfer::app::manager::TransferManager;
//! use depot_transfer::app::resource::{Location, VirtualResource};
//! use depot_transfer::app::transfer::TransferRegistry;
//! use depot_transfer::app::transport::{HttpTransport, HttpTransportConfig, TransportRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = FileCache::new(FileCacheConfig::default()).await?;
//! let transports = TransportRegistry::new()
//!     .with_transport(Arc::new(HttpTransport::new(HttpTransportConfig::default())?));
//! let manager = TransferManager::builder(TransferRegistry::new(Arc::new(cache)), transports).build()?;
//!
//! let locations = vec![
//!     Arc::new(Location::new("central", "https://repo1.maven.org/maven2")),
//!     Arc::new(Location::new("mirror", "https://mirror.example.org/maven2")),
//! ];
//! let pom = VirtualResource::from_locations(&locations, "/junit/junit/4.13.2/junit-4.13.2.pom");
//! if let Some(transfer) = manager.retrieve_first(&pom).await? {
//!     println!("{} bytes", transfer.read_to_vec().await?.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod listing;

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use crate::app::handlers::{DownloadHandler, ExistsHandler, ListingHandler, UploadHandler};
use crate::app::nfc::{NoOpNotFoundCache, NotFoundCache};
use crate::app::resource::{ConcreteResource, Resource, VirtualResource};
use crate::app::transfer::stream::{pipe, BytesReader, ContentReader};
use crate::app::transfer::{EventDispatcher, NoOpEventDispatcher, Transfer, TransferEvent, TransferRegistry};
use crate::app::transport::{Transport, TransportRegistry};
use crate::app::worker::{PoolConfig, PoolStats, WorkerPool};
use crate::errors::{ConfigResult, TransferError, TransferResult};

pub use batch::TransferBatch;
pub use config::ManagerConfig;

/// Orchestrates cache lookups, remote fallback and batch retrieval
#[derive(Debug, Clone)]
pub struct TransferManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    registry: TransferRegistry,
    transports: TransportRegistry,
    nfc: Arc<dyn NotFoundCache>,
    events: Arc<dyn EventDispatcher>,
    config: ManagerConfig,
    /// Runs network jobs
    pool: WorkerPool,
    /// Runs batch retriers, which in turn submit network jobs to `pool`
    batch_pool: WorkerPool,
    downloads: DownloadHandler,
    uploads: UploadHandler,
    listings: ListingHandler,
    existence: ExistsHandler,
}

/// Builder wiring the manager's collaborators together
#[derive(Debug)]
pub struct TransferManagerBuilder {
    registry: TransferRegistry,
    transports: TransportRegistry,
    pool_config: PoolConfig,
    nfc: Arc<dyn NotFoundCache>,
    events: Arc<dyn EventDispatcher>,
    config: ManagerConfig,
}

impl TransferManagerBuilder {
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn not_found_cache(mut self, nfc: Arc<dyn NotFoundCache>) -> Self {
        self.nfc = nfc;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and start the worker pools
    pub fn build(self) -> ConfigResult<TransferManager> {
        self.config.validate()?;
        let pool = WorkerPool::new(self.pool_config.clone())?;
        let batch_pool = WorkerPool::new(self.pool_config)?;

        Ok(TransferManager {
            inner: Arc::new(ManagerInner {
                downloads: DownloadHandler::new(pool.clone(), self.nfc.clone()),
                uploads: UploadHandler::new(pool.clone(), self.nfc.clone()),
                listings: ListingHandler::new(pool.clone(), self.nfc.clone()),
                existence: ExistsHandler::new(pool.clone(), self.nfc.clone()),
                registry: self.registry,
                transports: self.transports,
                nfc: self.nfc,
                events: self.events,
                config: self.config,
                pool,
                batch_pool,
            }),
        })
    }
}

impl TransferManager {
    /// Start building a manager over `registry` and `transports`
    pub fn builder(registry: TransferRegistry, transports: TransportRegistry) -> TransferManagerBuilder {
        TransferManagerBuilder {
            registry,
            transports,
            pool_config: PoolConfig::default(),
            nfc: Arc::new(NoOpNotFoundCache),
            events: Arc::new(NoOpEventDispatcher),
            config: ManagerConfig::default(),
        }
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.inner.registry
    }

    pub fn not_found_cache(&self) -> &Arc<dyn NotFoundCache> {
        &self.inner.nfc
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Activity of the network job pool
    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Cache handle for `resource`
    pub fn get_cache_reference(&self, resource: &ConcreteResource) -> Transfer {
        self.inner.registry.get_transfer(resource)
    }

    /// Stop accepting network and batch work
    pub fn shutdown(&self) {
        info!("Shutting down transfer manager ({})", self.pool_stats());
        self.inner.pool.shutdown();
        self.inner.batch_pool.shutdown();
    }

    fn fire(&self, event: TransferEvent) {
        self.inner.events.fire(event);
    }

    fn timeout_for(&self, resource: &ConcreteResource) -> Duration {
        resource
            .location()
            .connection_timeout_or(self.inner.config.default_timeout)
    }

    fn transport_for(&self, resource: &ConcreteResource) -> TransferResult<Arc<dyn Transport>> {
        let location = resource.location();
        self.inner.transports.get(location).ok_or_else(|| {
            TransferError::location(
                location.name(),
                format!("no transport handles {}", location.uri()),
            )
        })
    }

    /// Whether `resource` exists in the cache or on the remote
    pub async fn exists_concrete(
        &self,
        resource: &ConcreteResource,
        suppress_failures: bool,
    ) -> TransferResult<bool> {
        if self.get_cache_reference(resource).exists().await? {
            return Ok(true);
        }
        if !resource.allows_downloading() {
            return Ok(false);
        }

        let transport = match self.transport_for(resource) {
            Ok(transport) => transport,
            Err(_) if suppress_failures => return Ok(false),
            Err(e) => return Err(e),
        };
        self.inner
            .existence
            .exists(resource, self.timeout_for(resource), transport, suppress_failures)
            .await
    }

    /// Whether any candidate of `resource` exists
    pub async fn exists(&self, resource: &Resource) -> TransferResult<bool> {
        match resource {
            Resource::Concrete(concrete) => self.exists_concrete(concrete, false).await,
            Resource::Virtual(candidates) => {
                Ok(self.find_first_existing(candidates).await?.is_some())
            }
        }
    }

    /// First candidate that exists, without downloading anything
    pub async fn find_first_existing(
        &self,
        resource: &VirtualResource,
    ) -> TransferResult<Option<ConcreteResource>> {
        for candidate in resource.iter() {
            if self.exists_concrete(candidate, true).await? {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    /// Every candidate that exists, in precedence order
    pub async fn find_all_existing(
        &self,
        resource: &VirtualResource,
    ) -> TransferResult<Vec<ConcreteResource>> {
        let mut found = Vec::new();
        for candidate in resource.iter() {
            if self.exists_concrete(candidate, true).await? {
                found.push(candidate.clone());
            }
        }
        Ok(found)
    }

    /// Cached content of `resource`, downloading it on a miss
    ///
    /// Returns `None` when neither the cache nor the remote has it, or when
    /// the location does not allow downloading.
    pub async fn retrieve(
        &self,
        resource: &ConcreteResource,
        suppress_failures: bool,
    ) -> TransferResult<Option<Transfer>> {
        let target = self.get_cache_reference(resource);
        if target.exists().await? {
            debug!("Cache hit for {}", resource);
            return Ok(Some(target));
        }
        if !resource.allows_downloading() {
            debug!("{} does not allow downloading", resource.location());
            return Ok(None);
        }

        let downloaded = match self.transport_for(resource) {
            Ok(transport) => {
                self.inner
                    .downloads
                    .download(
                        resource,
                        target.clone(),
                        self.timeout_for(resource),
                        transport,
                        suppress_failures,
                    )
                    .await
            }
            Err(_) if suppress_failures => Ok(None),
            Err(e) => Err(e),
        };

        let downloaded = match downloaded {
            Ok(downloaded) => downloaded,
            Err(e) => {
                self.fire(TransferEvent::AccessFailed {
                    resource: resource.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Some(downloaded) = downloaded {
            if !downloaded.ptr_eq(&target) && downloaded.resource() != target.resource() {
                debug!("Aliasing {} to {}", target, downloaded);
                self.inner
                    .registry
                    .provider()
                    .create_alias(downloaded.resource(), target.resource())
                    .await?;
            }
        }

        if target.exists().await? {
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    /// First candidate that can be retrieved, in precedence order
    ///
    /// Per-candidate failures never stop the search. When nothing is found
    /// the last error is returned only if every candidate failed with one.
    pub async fn retrieve_first(&self, resource: &VirtualResource) -> TransferResult<Option<Transfer>> {
        let mut last_error = None;
        let mut every_attempt_failed = true;

        for candidate in resource.iter() {
            match self.retrieve(candidate, false).await {
                Ok(Some(transfer)) => return Ok(Some(transfer)),
                Ok(None) => every_attempt_failed = false,
                Err(e) => {
                    debug!("Candidate {} failed: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }

        self.fire(TransferEvent::NotFound {
            resource: resource.clone().into(),
        });
        match last_error {
            Some(e) if every_attempt_failed => Err(e),
            _ => Ok(None),
        }
    }

    /// Every candidate that can be retrieved
    pub async fn retrieve_all(&self, resource: &VirtualResource) -> TransferResult<Vec<Transfer>> {
        let mut transfers = Vec::new();
        for candidate in resource.iter() {
            match self.retrieve(candidate, false).await {
                Ok(Some(transfer)) => transfers.push(transfer),
                Ok(None) => {}
                Err(e) => warn!("Skipping {}: {}", candidate, e),
            }
        }
        if transfers.is_empty() {
            self.fire(TransferEvent::NotFound {
                resource: resource.clone().into(),
            });
        }
        Ok(transfers)
    }

    /// Write `content` into the cache at `resource`
    pub async fn store(
        &self,
        resource: &ConcreteResource,
        content: &mut dyn ContentReader,
    ) -> TransferResult<Transfer> {
        if !resource.allows_storing() {
            return Err(TransferError::NotAllowed {
                resource: resource.to_string(),
                operation: "store".to_string(),
            });
        }
        let transfer = self.write_into_cache(resource, content).await?;
        self.fire(TransferEvent::Stored {
            resource: resource.clone(),
        });
        Ok(transfer)
    }

    /// [`store`](Self::store) for in-memory content
    pub async fn store_bytes(&self, resource: &ConcreteResource, data: &[u8]) -> TransferResult<Transfer> {
        let mut reader = BytesReader::new(data.to_vec());
        self.store(resource, &mut reader).await
    }

    async fn write_into_cache(
        &self,
        resource: &ConcreteResource,
        content: &mut dyn ContentReader,
    ) -> TransferResult<Transfer> {
        let transfer = self.get_cache_reference(resource);
        let writer = transfer.open_output().await?;
        let bytes = pipe(content, writer).await?;
        self.inner.nfc.clear_missing(resource);
        info!("Stored {} ({} bytes)", resource, bytes);
        Ok(transfer)
    }

    /// Cache `content` and upload it to the remote
    ///
    /// Returns whether the remote accepted the upload.
    pub async fn publish(
        &self,
        resource: &ConcreteResource,
        content: &mut dyn ContentReader,
    ) -> TransferResult<bool> {
        if !resource.allows_publishing() {
            return Err(TransferError::NotAllowed {
                resource: resource.to_string(),
                operation: "publish".to_string(),
            });
        }
        let transport = self.transport_for(resource)?;
        let source = self.write_into_cache(resource, content).await?;

        let published = self
            .inner
            .uploads
            .upload(resource, source, self.timeout_for(resource), transport, false)
            .await;
        match published {
            Ok(true) => {
                self.fire(TransferEvent::Published {
                    resource: resource.clone(),
                });
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                self.fire(TransferEvent::AccessFailed {
                    resource: resource.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Remove `resource` from the cache, depth-first for directories
    ///
    /// The first child that fails to delete aborts the whole operation.
    pub fn delete<'a>(&'a self, resource: &'a ConcreteResource) -> BoxFuture<'a, TransferResult<bool>> {
        async move {
            let transfer = self.get_cache_reference(resource);
            if !transfer.exists().await? {
                return Ok(false);
            }

            if transfer.is_directory().await? {
                for name in transfer.list().await? {
                    let child = resource.child(name.trim_end_matches('/'));
                    self.delete(&child).await?;
                }
            }

            let removed = transfer.delete().await?;
            if removed {
                self.fire(TransferEvent::Deleted {
                    resource: resource.clone(),
                });
            }
            Ok(removed)
        }
        .boxed()
    }
}
