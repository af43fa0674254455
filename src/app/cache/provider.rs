//! Storage back-end interface consumed by transfer handles

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::resource::ConcreteResource;
use crate::app::transfer::stream::{ContentReader, ContentWriter};
use crate::errors::TransferResult;

/// Local storage for cached content
///
/// Every operation addresses a [`ConcreteResource`]; how the resource maps to
/// physical storage is the provider's concern. Listing entries that are
/// directories carry a trailing `/`.
///
/// The lock operations default to no-ops for providers that do not need
/// explicit coordination.
#[async_trait]
pub trait CacheProvider: Send + Sync + Debug {
    /// Short provider name for logs
    fn name(&self) -> &'static str;

    async fn exists(&self, resource: &ConcreteResource) -> TransferResult<bool>;

    async fn is_file(&self, resource: &ConcreteResource) -> TransferResult<bool>;

    async fn is_directory(&self, resource: &ConcreteResource) -> TransferResult<bool>;

    /// Open cached content for reading
    async fn open_input(&self, resource: &ConcreteResource) -> TransferResult<Box<dyn ContentReader>>;

    /// Open a writer that replaces the cached content on `finish`
    async fn open_output(&self, resource: &ConcreteResource)
        -> TransferResult<Box<dyn ContentWriter>>;

    /// Remove a file or an empty directory, returning whether anything was removed
    async fn delete(&self, resource: &ConcreteResource) -> TransferResult<bool>;

    /// Names of the direct children of a directory
    async fn list(&self, resource: &ConcreteResource) -> TransferResult<Vec<String>>;

    /// Create a directory and all missing ancestors
    async fn mkdirs(&self, resource: &ConcreteResource) -> TransferResult<()>;

    /// Create an empty file if nothing exists yet
    async fn create_file(&self, resource: &ConcreteResource) -> TransferResult<()>;

    /// Copy content from one resource to another, replacing the destination
    async fn copy(&self, from: &ConcreteResource, to: &ConcreteResource) -> TransferResult<()>;

    /// Make `alias` serve the content already cached for `target`
    async fn create_alias(
        &self,
        target: &ConcreteResource,
        alias: &ConcreteResource,
    ) -> TransferResult<()>;

    /// Content size in bytes, `None` when absent
    async fn length(&self, resource: &ConcreteResource) -> TransferResult<Option<u64>>;

    /// Last modification time, `None` when absent
    async fn last_modified(
        &self,
        resource: &ConcreteResource,
    ) -> TransferResult<Option<DateTime<Utc>>>;

    /// Called once when a new transfer handle is created for `resource`
    fn on_transfer_created(&self, _resource: &ConcreteResource) {}

    async fn lock_read(&self, _resource: &ConcreteResource) -> TransferResult<()> {
        Ok(())
    }

    fn unlock_read(&self, _resource: &ConcreteResource) {}

    async fn lock_write(&self, _resource: &ConcreteResource) -> TransferResult<()> {
        Ok(())
    }

    fn unlock_write(&self, _resource: &ConcreteResource) {}

    fn is_read_locked(&self, _resource: &ConcreteResource) -> bool {
        false
    }

    fn is_write_locked(&self, _resource: &ConcreteResource) -> bool {
        false
    }

    /// Block until no reader holds `resource`
    async fn wait_for_read_unlock(&self, _resource: &ConcreteResource) -> TransferResult<()> {
        Ok(())
    }

    /// Block until no writer holds `resource`
    async fn wait_for_write_unlock(&self, _resource: &ConcreteResource) -> TransferResult<()> {
        Ok(())
    }
}
