//! Transfer handles
//!
//! A [`Transfer`] is the unit every other component passes around: one
//! resource bound to one cache provider plus the decorator chain. Handles
//! are obtained from a [`TransferRegistry`](super::TransferRegistry) which
//! guarantees that the same resource maps to the same handle while any clone
//! of it is alive.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::cache::CacheProvider;
use crate::app::resource::{ConcreteResource, Location};
use crate::errors::TransferResult;

use super::decorator::TransferDecorator;
use super::registry::TransferRegistry;
use super::stream::{ContentReader, ContentWriter};

pub(crate) struct TransferInner {
    pub(crate) resource: ConcreteResource,
    pub(crate) registry: TransferRegistry,
}

/// Handle to one cached resource
#[derive(Clone)]
pub struct Transfer {
    inner: Arc<TransferInner>,
}

impl Transfer {
    pub(crate) fn from_inner(inner: Arc<TransferInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<TransferInner> {
        &self.inner
    }

    /// Resource this handle addresses
    pub fn resource(&self) -> &ConcreteResource {
        &self.inner.resource
    }

    pub fn location(&self) -> &Arc<Location> {
        self.inner.resource.location()
    }

    pub fn path(&self) -> &str {
        self.inner.resource.path()
    }

    /// Registry that issued this handle
    pub fn registry(&self) -> &TransferRegistry {
        &self.inner.registry
    }

    fn provider(&self) -> &Arc<dyn CacheProvider> {
        self.inner.registry.provider()
    }

    fn decorators(&self) -> &[Arc<dyn TransferDecorator>] {
        self.inner.registry.decorators()
    }

    /// True when both handles are the same instance
    pub fn ptr_eq(&self, other: &Transfer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether content is present; the first decorator with an opinion wins
    pub async fn exists(&self) -> TransferResult<bool> {
        for decorator in self.decorators() {
            if let Some(answer) = decorator.decorate_exists(self).await? {
                return Ok(answer);
            }
        }
        self.provider().exists(self.resource()).await
    }

    pub async fn is_file(&self) -> TransferResult<bool> {
        self.provider().is_file(self.resource()).await
    }

    pub async fn is_directory(&self) -> TransferResult<bool> {
        self.provider().is_directory(self.resource()).await
    }

    /// Open the content for reading through the decorator chain
    pub async fn open_input(&self) -> TransferResult<Box<dyn ContentReader>> {
        let mut reader = self.provider().open_input(self.resource()).await?;
        for decorator in self.decorators() {
            reader = decorator.decorate_read(self, reader);
        }
        Ok(reader)
    }

    /// Open the content for writing through the decorator chain
    pub async fn open_output(&self) -> TransferResult<Box<dyn ContentWriter>> {
        let mut writer = self.provider().open_output(self.resource()).await?;
        for decorator in self.decorators() {
            writer = decorator.decorate_write(self, writer);
        }
        Ok(writer)
    }

    /// Read the whole content into memory
    pub async fn read_to_vec(&self) -> TransferResult<Vec<u8>> {
        let mut reader = self.open_input().await?;
        reader.read_to_end().await
    }

    /// Replace the content with `data`
    pub async fn write_bytes(&self, data: &[u8]) -> TransferResult<u64> {
        let mut writer = self.open_output().await?;
        writer.write_all(data).await?;
        writer.finish().await
    }

    /// Delete a file or an empty directory
    pub async fn delete(&self) -> TransferResult<bool> {
        for decorator in self.decorators() {
            decorator.decorate_delete(self).await?;
        }
        self.provider().delete(self.resource()).await
    }

    /// Names of direct children; directories carry a trailing `/`
    pub async fn list(&self) -> TransferResult<Vec<String>> {
        let mut entries = self.provider().list(self.resource()).await?;
        for decorator in self.decorators() {
            entries = decorator.decorate_list(self, entries).await?;
        }
        Ok(entries)
    }

    pub async fn mkdirs(&self) -> TransferResult<()> {
        self.provider().mkdirs(self.resource()).await?;
        for decorator in self.decorators() {
            decorator.decorate_mkdirs(self).await?;
        }
        Ok(())
    }

    pub async fn create_file(&self) -> TransferResult<()> {
        self.provider().create_file(self.resource()).await
    }

    /// Copy this content over `to`
    pub async fn copy_to(&self, to: &Transfer) -> TransferResult<()> {
        self.provider().copy(self.resource(), to.resource()).await
    }

    pub async fn length(&self) -> TransferResult<Option<u64>> {
        self.provider().length(self.resource()).await
    }

    pub async fn last_modified(&self) -> TransferResult<Option<DateTime<Utc>>> {
        self.provider().last_modified(self.resource()).await
    }

    /// Handle for the child entry `name`
    pub fn child(&self, name: &str) -> Transfer {
        self.registry().get_transfer(&self.resource().child(name))
    }

    /// Handle for the parent directory, `None` at the root
    pub fn parent(&self) -> Option<Transfer> {
        self.resource()
            .parent()
            .map(|parent| self.registry().get_transfer(&parent))
    }

    /// Handle for this path with `suffix` appended (e.g. `.md5`)
    pub fn sibling_with_suffix(&self, suffix: &str) -> Transfer {
        self.registry()
            .get_transfer(&self.resource().with_suffix(suffix))
    }

    pub async fn lock_read(&self) -> TransferResult<()> {
        self.provider().lock_read(self.resource()).await
    }

    pub fn unlock_read(&self) {
        self.provider().unlock_read(self.resource())
    }

    pub async fn lock_write(&self) -> TransferResult<()> {
        self.provider().lock_write(self.resource()).await
    }

    pub fn unlock_write(&self) {
        self.provider().unlock_write(self.resource())
    }

    pub fn is_read_locked(&self) -> bool {
        self.provider().is_read_locked(self.resource())
    }

    pub fn is_write_locked(&self) -> bool {
        self.provider().is_write_locked(self.resource())
    }

    pub async fn wait_for_read_unlock(&self) -> TransferResult<()> {
        self.provider().wait_for_read_unlock(self.resource()).await
    }

    pub async fn wait_for_write_unlock(&self) -> TransferResult<()> {
        self.provider().wait_for_write_unlock(self.resource()).await
    }
}

impl PartialEq for Transfer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.resource() == other.resource()
    }
}

impl Eq for Transfer {}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("resource", &self.inner.resource.to_string())
            .field("provider", &self.provider().name())
            .finish()
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.resource.fmt(f)
    }
}
