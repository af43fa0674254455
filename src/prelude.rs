//! Prelude module for the Depot Transfer library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use depot_transfer::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use depot_transfer::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cache = FileCache::new(FileCacheConfig::default()).await?;
//!     let transports = TransportRegistry::new()
//!         .with_transport(Arc::new(HttpTransport::new(HttpTransportConfig::default())?));
//!     let manager = TransferManager::builder(TransferRegistry::new(Arc::new(cache)), transports)
//!         .build()?;
//!
//!     let central = Arc::new(Location::new("central", "https://repo.example.org/maven2"));
//!     let batch = manager
//!         .batch_retrieve(vec![Resource::from(ConcreteResource::new(central, "/a/a.pom"))])
//!         .await;
//!     println!("{} retrieved", batch.transfers().len());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result, TransferError, TransferResult};

// Essential engine components that are used in most integrations
pub use crate::app::{
    CacheProvider,
    ChecksumDecorator,
    // Resource model
    ConcreteResource,
    ExpiringNotFoundCache,
    // Storage
    FileCache,
    FileCacheConfig,
    FileTransport,
    // Transports
    HttpTransport,
    HttpTransportConfig,
    Location,
    ManagerConfig,
    NotFoundCache,
    PathMappedCache,
    PathMappedConfig,
    PoolConfig,
    Reclaimer,
    Resource,
    Transfer,
    TransferBatch,
    // Orchestration
    TransferManager,
    TransferRegistry,
    TransportRegistry,
    VirtualResource,
};

// Configuration
pub use crate::config::AppConfig;
