//! Engine startup for Depot Transfer
//!
//! Builds the dependency graph from the loaded configuration: the selected
//! cache provider behind a transfer registry, the transports, the not-found
//! cache and the transfer manager, plus the background reclaimer when the
//! path-mapped store is in use.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::app::cache::{CacheProvider, FileCache};
use crate::app::manager::TransferManager;
use crate::app::mapped::{PathMappedCache, Reclaimer};
use crate::app::nfc::{ExpiringNotFoundCache, NoOpNotFoundCache, NotFoundCache};
use crate::app::resource::{ConcreteResource, Location, Resource, VirtualResource};
use crate::app::transfer::{ChecksumDecorator, TransferDecorator, TransferRegistry};
use crate::app::transport::{FileTransport, HttpTransport, TransportRegistry};
use crate::config::{AppConfig, StorageKind};
use crate::errors::{AppError, Result};

/// A running engine and the services it owns
#[derive(Debug)]
pub struct Engine {
    pub manager: TransferManager,
    pub locations: Vec<Arc<Location>>,
    /// Present when the path-mapped store backs the cache
    pub store: Option<PathMappedCache>,
    reclaimer: Option<Reclaimer>,
}

impl Engine {
    /// Wire every component from `config`
    ///
    /// `cache_dir` overrides the configured cache root.
    pub async fn start(config: &AppConfig, cache_dir: Option<PathBuf>) -> Result<Self> {
        let mut storage = config.storage.clone();
        if let Some(dir) = cache_dir {
            storage.cache_root = Some(dir);
        }

        let (provider, store): (Arc<dyn CacheProvider>, Option<PathMappedCache>) = match storage.kind
        {
            StorageKind::File => {
                let cache = FileCache::new(storage.to_file_cache_config()).await?;
                info!("Using file cache at {}", cache.root().display());
                (Arc::new(cache), None)
            }
            StorageKind::PathMapped => {
                let store =
                    PathMappedCache::new(storage.to_path_mapped_config(&config.path_mapped))
                        .await?;
                info!("Using path-mapped store at {}", store.blobs().root().display());
                (Arc::new(store.clone()), Some(store))
            }
        };

        let mut decorators: Vec<Arc<dyn TransferDecorator>> = Vec::new();
        if storage.checksums {
            decorators.push(Arc::new(ChecksumDecorator::new()));
        }
        let registry = TransferRegistry::with_decorators(provider, decorators);

        let transports = TransportRegistry::new()
            .with_transport(Arc::new(FileTransport::new()))
            .with_transport(Arc::new(HttpTransport::new(config.http.to_runtime_config())?));

        let nfc: Arc<dyn NotFoundCache> = match config.nfc.ttl() {
            Some(ttl) => Arc::new(ExpiringNotFoundCache::new(ttl)),
            None => Arc::new(NoOpNotFoundCache),
        };

        let manager = TransferManager::builder(registry, transports)
            .pool_config(config.pool.to_runtime_config())
            .not_found_cache(nfc)
            .config(config.transfer.to_runtime_config())
            .build()?;

        let reclaimer = store
            .as_ref()
            .map(|store| Reclaimer::spawn(store.clone(), store.config().gc_interval));

        debug!("Engine ready with {} locations", config.locations.len());
        Ok(Self {
            manager,
            locations: config.runtime_locations(),
            store,
            reclaimer,
        })
    }

    /// Location named `name`
    pub fn location(&self, name: &str) -> Result<Arc<Location>> {
        self.locations
            .iter()
            .find(|location| location.name() == name)
            .cloned()
            .ok_or_else(|| AppError::generic(format!("Unknown location '{}'", name)))
    }

    /// Resource for `path`: concrete when a location is named, otherwise
    /// every configured location in order
    pub fn resolve(&self, location: Option<&str>, path: &str) -> Result<Resource> {
        match location {
            Some(name) => Ok(ConcreteResource::new(self.location(name)?, path).into()),
            None if self.locations.is_empty() => Err(AppError::generic(
                "No locations configured; add [[locations]] to the config file",
            )),
            None => Ok(VirtualResource::from_locations(&self.locations, path).into()),
        }
    }

    /// Stop background work and the worker pools
    pub async fn shutdown(self) {
        if let Some(reclaimer) = self.reclaimer {
            reclaimer.shutdown().await;
        }
        self.manager.shutdown();
    }
}
