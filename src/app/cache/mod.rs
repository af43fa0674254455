//! Cache providers and the lock-coordinated file cache
//!
//! # Key Features
//!
//! - **Provider interface**: [`CacheProvider`] is the storage seam consumed by transfer handles
//! - **Per-location layout**: each location gets its own hashed base directory
//! - **Read/write locks**: writers are exclusive, readers can join a streaming write
//! - **Age-based expiry**: stale files are renamed aside and deleted on access
//!
//! # Module Organization
//!
//! - [`provider`] - The cache provider trait
//! - [`config`] - File cache configuration and defaults
//! - [`locks`] - Per-path lock manager
//! - [`file`] - File cache provider
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depot_transfer::app::cache::{FileCache, FileCacheConfig};
//! use depot_transfer::app::resource::{ConcreteResource, Location};
//! use depot_transfer::app::transfer::TransferRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = FileCache::new(FileCacheConfig::with_cache_root("/tmp/depot".into())).await?;
//! let registry = TransferRegistry::new(Arc::new(cache));
//!
//! let location = Arc::new(Location::new("central", "https://repo.example.org/maven2"));
//! let transfer = registry.get_transfer(&ConcreteResource::new(location, "/org/foo/foo.pom"));
//! transfer.write_bytes(b"<project/>").await?;
//! assert!(transfer.exists().await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod file;
pub mod locks;
pub mod provider;

#[cfg(test)]
mod tests;

pub use config::FileCacheConfig;
pub use file::FileCache;
pub use locks::{LockManager, WriteProgress};
pub use provider::CacheProvider;
