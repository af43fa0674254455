//! Cache provider resolving every path through the path database
//!
//! Each location name is one logical file system. Writes stream into a fresh
//! blob and only become visible once the writer finishes cleanly; copies and
//! aliases share the source's blob instead of duplicating bytes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::app::cache::CacheProvider;
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::stream::{ContentReader, ContentWriter, FileReader};
use crate::constants::files::DIRECTORY_MARKER;
use crate::errors::{CacheError, CacheResult, TransferResult};

use super::config::PathMappedConfig;
use super::db::PathDb;
use super::model::{ContentId, PathKey, PathMap};
use super::physical::BlobStore;

/// Content-addressed, path-indirected cache provider
#[derive(Debug, Clone)]
pub struct PathMappedCache {
    inner: Arc<PathMappedInner>,
}

#[derive(Debug)]
struct PathMappedInner {
    db: PathDb,
    blobs: BlobStore,
    config: PathMappedConfig,
}

impl PathMappedCache {
    /// Open the store described by `config`
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the configuration is invalid or the database
    /// or blob directory cannot be opened
    pub async fn new(config: PathMappedConfig) -> CacheResult<Self> {
        config
            .validate()
            .map_err(|reason| CacheError::InvalidState { reason })?;
        let database = config.database_path()?;
        let db = PathDb::open(&database)?;
        let blobs = BlobStore::new(config.blob_path()?).await?;
        info!(
            "Opened path-mapped store (database {}, blobs {})",
            database.display(),
            blobs.root().display()
        );
        Ok(Self::from_parts(db, blobs, config))
    }

    /// Assemble a store from an already opened database and blob directory
    pub fn from_parts(db: PathDb, blobs: BlobStore, config: PathMappedConfig) -> Self {
        Self {
            inner: Arc::new(PathMappedInner { db, blobs, config }),
        }
    }

    pub fn db(&self) -> &PathDb {
        &self.inner.db
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.inner.blobs
    }

    pub fn config(&self) -> &PathMappedConfig {
        &self.inner.config
    }

    /// Path key of `resource`; the location name is the file system id
    pub fn key_for(resource: &ConcreteResource) -> PathKey {
        PathKey::new(resource.location().name(), resource.path())
    }

    /// Entry currently recorded for `resource`
    pub fn entry(&self, resource: &ConcreteResource) -> CacheResult<Option<PathMap>> {
        self.inner.db.get(&Self::key_for(resource))
    }

    /// Run a database operation on the blocking pool
    pub async fn with_db<T, F>(&self, op: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&PathDb) -> CacheResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || op(&inner.db))
            .await
            .map_err(|e| CacheError::InvalidState {
                reason: format!("path database task failed: {}", e),
            })?
    }

    async fn lookup(&self, resource: &ConcreteResource) -> CacheResult<Option<PathMap>> {
        let key = Self::key_for(resource);
        self.with_db(move |db| db.get(&key)).await
    }

    fn timeout_for(&self, location: &Location) -> Duration {
        let config = &self.inner.config;
        location.cache_timeout_or(config.default_timeout, config.min_timeout)
    }

    /// Delete `resource` if it is a file older than its location's timeout
    ///
    /// Returns `true` when the entry was evicted.
    pub async fn evict_if_expired(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        match self.lookup(resource).await? {
            Some(entry) => self.evict_stale(resource, &entry).await,
            None => Ok(false),
        }
    }

    /// Evict `entry`, as read earlier, if it has outlived its timeout
    ///
    /// The row is removed only while it still holds the content id seen in
    /// `entry`, so a write that landed after the read survives.
    pub async fn evict_stale(
        &self,
        resource: &ConcreteResource,
        entry: &PathMap,
    ) -> TransferResult<bool> {
        let Some(content_id) = entry.content_id else {
            return Ok(false);
        };
        let age = (Utc::now() - entry.creation).to_std().unwrap_or(Duration::ZERO);
        if age <= self.timeout_for(resource.location()) {
            return Ok(false);
        }

        let key = entry.key.clone();
        let evicted = self
            .with_db(move |db| db.delete_if_content(&key, &content_id))
            .await?;
        if evicted {
            debug!("Evicted expired entry {} (age {:?})", resource, age);
        }
        Ok(evicted)
    }

    async fn file_entry(&self, resource: &ConcreteResource) -> CacheResult<Option<PathMap>> {
        Ok(self.lookup(resource).await?.filter(|entry| !entry.is_directory()))
    }
}

#[async_trait]
impl CacheProvider for PathMappedCache {
    fn name(&self) -> &'static str {
        "path-mapped"
    }

    async fn exists(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        Ok(self.lookup(resource).await?.is_some())
    }

    async fn is_file(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        Ok(self.file_entry(resource).await?.is_some())
    }

    async fn is_directory(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        Ok(self
            .lookup(resource)
            .await?
            .map(|entry| entry.is_directory())
            .unwrap_or(false))
    }

    async fn open_input(&self, resource: &ConcreteResource) -> TransferResult<Box<dyn ContentReader>> {
        let entry = self.lookup(resource).await?.ok_or_else(|| CacheError::NotFound {
            path: resource.to_string(),
        })?;
        let pointer = entry.storage_pointer.ok_or_else(|| CacheError::NotAFile {
            path: resource.to_string(),
        })?;
        let file = self.inner.blobs.open(&pointer).await?;
        Ok(Box::new(FileReader::new(file)))
    }

    async fn open_output(&self, resource: &ConcreteResource) -> TransferResult<Box<dyn ContentWriter>> {
        let key = Self::key_for(resource);
        if key.is_root() || self.lookup(resource).await?.is_some_and(|e| e.is_directory()) {
            return Err(CacheError::NotAFile {
                path: resource.to_string(),
            }
            .into());
        }

        let content_id = ContentId::generate(&key.file_system, &key.path());
        let pointer = content_id.storage_pointer();
        let file = self.inner.blobs.create(&pointer).await?;
        debug!("Writing {} into blob {}", resource, pointer);

        Ok(Box::new(MappedWriter {
            store: self.clone(),
            key,
            content_id,
            pointer,
            file: Some(file),
            written: 0,
        }))
    }

    async fn delete(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        let key = Self::key_for(resource);
        Ok(self.with_db(move |db| db.delete(&key)).await?)
    }

    async fn list(&self, resource: &ConcreteResource) -> TransferResult<Vec<String>> {
        let key = Self::key_for(resource);
        let children = self
            .with_db(move |db| match db.get(&key)? {
                Some(entry) if entry.is_directory() => db.list(&key),
                _ => Ok(Vec::new()),
            })
            .await?;
        Ok(children
            .into_iter()
            .map(|child| {
                if child.is_directory() {
                    format!("{}{}", child.key.filename, DIRECTORY_MARKER)
                } else {
                    child.key.filename
                }
            })
            .collect())
    }

    async fn mkdirs(&self, resource: &ConcreteResource) -> TransferResult<()> {
        let key = Self::key_for(resource);
        Ok(self.with_db(move |db| db.mkdirs(&key)).await?)
    }

    async fn create_file(&self, resource: &ConcreteResource) -> TransferResult<()> {
        if self.lookup(resource).await?.is_some() {
            return Ok(());
        }
        let writer = self.open_output(resource).await?;
        writer.finish().await?;
        Ok(())
    }

    async fn copy(&self, from: &ConcreteResource, to: &ConcreteResource) -> TransferResult<()> {
        let (from, to) = (Self::key_for(from), Self::key_for(to));
        self.with_db(move |db| db.copy(&from, &to)).await?;
        Ok(())
    }

    async fn create_alias(
        &self,
        target: &ConcreteResource,
        alias: &ConcreteResource,
    ) -> TransferResult<()> {
        self.copy(target, alias).await?;
        debug!("Aliased {} to {}", alias, target);
        Ok(())
    }

    async fn length(&self, resource: &ConcreteResource) -> TransferResult<Option<u64>> {
        Ok(self.file_entry(resource).await?.map(|entry| entry.size))
    }

    async fn last_modified(
        &self,
        resource: &ConcreteResource,
    ) -> TransferResult<Option<DateTime<Utc>>> {
        Ok(self.lookup(resource).await?.map(|entry| entry.creation))
    }

    fn on_transfer_created(&self, resource: &ConcreteResource) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.clone();
        let resource = resource.clone();
        runtime.spawn(async move {
            if let Err(e) = store.evict_if_expired(&resource).await {
                debug!("Expiry check for {} failed: {}", resource, e);
            }
        });
    }
}

/// Writer streaming into a fresh blob; the path entry is recorded on finish
struct MappedWriter {
    store: PathMappedCache,
    key: PathKey,
    content_id: ContentId,
    pointer: String,
    file: Option<fs::File>,
    written: u64,
}

impl MappedWriter {
    async fn discard(&mut self) {
        self.file.take();
        if let Err(e) = self.store.inner.blobs.delete(&self.pointer).await {
            warn!("Failed to remove partial blob {}: {}", self.pointer, e);
        }
    }
}

#[async_trait]
impl ContentWriter for MappedWriter {
    async fn write_all(&mut self, data: &[u8]) -> TransferResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(CacheError::InvalidState {
                reason: "writer already finished".to_string(),
            }
            .into());
        };
        if let Err(e) = file.write_all(data).await {
            self.discard().await;
            return Err(e.into());
        }
        self.written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> TransferResult<u64> {
        let Some(mut file) = self.file.take() else {
            return Ok(self.written);
        };
        let flushed = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = flushed {
            self.discard().await;
            return Err(e.into());
        }

        let map = PathMap::file(self.key.clone(), self.content_id, self.written);
        if let Err(e) = self.store.with_db(move |db| db.insert(&map)).await {
            self.discard().await;
            return Err(e.into());
        }
        debug!(
            "Recorded {} ({} bytes, content {})",
            self.key, self.written, self.content_id
        );
        Ok(self.written)
    }
}

impl Drop for MappedWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let blobs = self.store.inner.blobs.clone();
            let pointer = std::mem::take(&mut self.pointer);
            let remove = move || {
                if let Err(e) = blobs.delete_now(&pointer) {
                    warn!("Failed to remove aborted blob {}: {}", pointer, e);
                }
            };
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn_blocking(remove);
                }
                Err(_) => remove(),
            }
            debug!("Discarded aborted write of {}", self.key);
        }
    }
}
