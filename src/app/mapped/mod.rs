//! Path-mapped content store
//!
//! Logical paths resolve through a SQLite path database to physical blobs.
//! Several paths may share one blob after a copy; deleting the last
//! reference queues the blob for reclaim instead of removing it at once.
//!
//! # Module Organization
//!
//! - [`model`] - Content ids, path keys and the logical records
//! - [`db`] - Transactional path database
//! - [`physical`] - Sharded blob directory
//! - [`provider`] - [`PathMappedCache`], the cache provider
//! - [`reclaim`] - Garbage collection of unreferenced blobs
//! - [`config`] - Store configuration
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depot_transfer::app::mapped::{PathMappedCache, PathMappedConfig};
//! use depot_transfer::app::resource::{ConcreteResource, Location};
//! use depot_transfer::app::transfer::TransferRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PathMappedCache::new(PathMappedConfig::with_root("/tmp/depot".into())).await?;
//! let registry = TransferRegistry::new(Arc::new(store.clone()));
//!
//! let location = Arc::new(Location::new("central", "https://repo.example.org/maven2"));
//! let jar = registry.get_transfer(&ConcreteResource::new(location.clone(), "/a/a.jar"));
//! jar.write_bytes(b"jar").await?;
//! jar.copy_to(&registry.get_transfer(&ConcreteResource::new(location, "/b/a.jar"))).await?;
//!
//! let report = store.gc_expired().await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod model;
pub mod physical;
pub mod provider;
pub mod reclaim;

#[cfg(test)]
mod tests;

pub use config::PathMappedConfig;
pub use db::PathDb;
pub use model::{ContentId, PathKey, PathMap, Reclaim, ReverseMap};
pub use physical::BlobStore;
pub use provider::PathMappedCache;
pub use reclaim::{GcReport, Reclaimer};
