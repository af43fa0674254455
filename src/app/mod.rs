//! Core engine for Depot Transfer
//!
//! This module contains the resource model, the transport SPI, the operation
//! handlers with in-flight joining, the transfer manager and both storage
//! backends.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depot_transfer::app::{
//!     ConcreteResource, ExpiringNotFoundCache, FileTransport, Location, PathMappedCache,
//!     PathMappedConfig, TransferManager, TransferRegistry, TransportRegistry,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PathMappedCache::new(PathMappedConfig::with_root("/tmp/depot".into())).await?;
//! let manager = TransferManager::builder(
//!     TransferRegistry::new(Arc::new(store)),
//!     TransportRegistry::new().with_transport(Arc::new(FileTransport::new())),
//! )
//! .not_found_cache(Arc::new(ExpiringNotFoundCache::new(std::time::Duration::from_secs(300))))
//! .build()?;
//!
//! let local = Arc::new(Location::new("local", "file:///srv/repository"));
//! let resource = ConcreteResource::new(local, "/org/foo/1.0/foo-1.0.jar");
//! if let Some(transfer) = manager.retrieve(&resource, false).await? {
//!     println!("cached {}", transfer);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod handlers;
pub mod manager;
pub mod mapped;
pub mod nfc;
pub mod resource;
pub mod transfer;
pub mod transport;
pub mod worker;

// Re-export main public API
pub use cache::{CacheProvider, FileCache, FileCacheConfig};
pub use manager::{ManagerConfig, TransferBatch, TransferManager};
pub use mapped::{GcReport, PathMappedCache, PathMappedConfig, Reclaimer};
pub use nfc::{ExpiringNotFoundCache, NoOpNotFoundCache, NotFoundCache};
pub use resource::{ConcreteResource, Location, Resource, VirtualResource};
pub use transfer::{
    ChecksumDecorator, ContentReader, ContentWriter, EventDispatcher, Transfer, TransferDecorator,
    TransferEvent, TransferRegistry,
};
pub use transport::{
    FileTransport, HttpTransport, HttpTransportConfig, MemoryTransport, Transport,
    TransportRegistry,
};
pub use worker::{PoolConfig, WorkerPool};
