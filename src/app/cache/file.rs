//! Lock-coordinated direct file cache
//!
//! Every resource maps to exactly one physical file under
//! `<root>/<md5(location uri)>/<path>`. Reads and writes go through the
//! shared [`LockManager`]; a reader that arrives while a writer is still
//! streaming tails the file until the writer completes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::stream::{pipe, ContentReader, ContentWriter};
use crate::constants::files::{DIRECTORY_MARKER, EXPIRED_SUFFIX};
use crate::errors::{CacheError, CacheResult, TransferError, TransferResult};

use super::config::FileCacheConfig;
use super::locks::{LockManager, ReadAccess, ReadGuard, WriteGuard, WriteProgress};
use super::provider::CacheProvider;

/// Cache provider storing content as plain files
#[derive(Debug, Clone)]
pub struct FileCache {
    inner: Arc<FileCacheInner>,
}

#[derive(Debug)]
struct FileCacheInner {
    root: PathBuf,
    config: FileCacheConfig,
    locks: Arc<LockManager>,
}

impl FileCache {
    /// Create a file cache, creating the root directory if needed
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the configuration is invalid or the root
    /// directory cannot be created
    pub async fn new(config: FileCacheConfig) -> CacheResult<Self> {
        config
            .validate()
            .map_err(|reason| CacheError::InvalidState { reason })?;
        let root = config.resolve_root()?;

        if fs::metadata(&root).await.is_err() {
            fs::create_dir_all(&root).await.map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible { path: root.clone() }
            })?;
        }
        info!("Initialized file cache with root: {}", root.display());

        Ok(Self {
            inner: Arc::new(FileCacheInner {
                locks: LockManager::new(config.lock_timeout),
                root,
                config,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &FileCacheConfig {
        &self.inner.config
    }

    /// Base directory holding everything cached for `location`
    pub fn location_dir(&self, location: &Location) -> PathBuf {
        self.inner
            .root
            .join(format!("{:x}", md5::compute(location.uri().as_bytes())))
    }

    /// Physical file backing `resource`
    pub fn physical_path(&self, resource: &ConcreteResource) -> PathBuf {
        let dir = self.location_dir(resource.location());
        let relative = resource.path().trim_start_matches('/');
        if relative.is_empty() {
            dir
        } else {
            dir.join(relative)
        }
    }

    fn timeout_for(&self, location: &Location) -> Duration {
        location.cache_timeout_or(self.inner.config.default_timeout, self.inner.config.min_timeout)
    }

    /// Rename aside and delete a file older than its location's timeout
    ///
    /// Files that are currently locked are never expired. Returns `true` when
    /// the file was removed.
    async fn expire_if_stale(&self, resource: &ConcreteResource, path: &Path) -> TransferResult<bool> {
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(false);
        }
        let locks = &self.inner.locks;
        if locks.is_write_locked(path) || locks.is_read_locked(path) {
            return Ok(false);
        }

        let age = metadata
            .modified()?
            .elapsed()
            .unwrap_or(Duration::ZERO);
        if age <= self.timeout_for(resource.location()) {
            return Ok(false);
        }

        let aside = with_suffix(path, EXPIRED_SUFFIX);
        fs::rename(path, &aside).await?;
        if let Err(e) = fs::remove_file(&aside).await {
            warn!("Failed to remove expired file {}: {}", aside.display(), e);
        }
        debug!("Expired cached file {} (age {:?})", resource, age);
        Ok(true)
    }

    async fn metadata(&self, resource: &ConcreteResource) -> TransferResult<Option<std::fs::Metadata>> {
        let path = self.physical_path(resource);
        if self.expire_if_stale(resource, &path).await? {
            return Ok(None);
        }
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_parent(path: &Path) -> TransferResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl CacheProvider for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn exists(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        Ok(self.metadata(resource).await?.is_some())
    }

    async fn is_file(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        Ok(self.metadata(resource).await?.map(|m| m.is_file()).unwrap_or(false))
    }

    async fn is_directory(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        Ok(self.metadata(resource).await?.map(|m| m.is_dir()).unwrap_or(false))
    }

    async fn open_input(&self, resource: &ConcreteResource) -> TransferResult<Box<dyn ContentReader>> {
        let path = self.physical_path(resource);
        match self.metadata(resource).await? {
            None => {
                return Err(CacheError::NotFound {
                    path: resource.to_string(),
                }
                .into())
            }
            Some(metadata) if metadata.is_dir() => {
                return Err(CacheError::NotAFile {
                    path: resource.to_string(),
                }
                .into())
            }
            Some(_) => {}
        }

        match self.inner.locks.read(&path).await? {
            ReadAccess::Direct(guard) => {
                let file = fs::File::open(&path).await?;
                Ok(Box::new(LockedFileReader {
                    file,
                    path,
                    position: 0,
                    progress: None,
                    _guard: guard,
                }))
            }
            ReadAccess::Joined(guard, mut progress) => {
                debug!("Joining in-progress write of {}", resource);
                let file = loop {
                    match fs::File::open(&path).await {
                        Ok(file) => break file,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            if progress.changed().await.is_err() || progress.borrow().failed {
                                return Err(TransferError::transfer(
                                    resource,
                                    "write aborted before content was available",
                                ));
                            }
                        }
                        Err(e) => return Err(e.into()),
                    }
                };
                Ok(Box::new(LockedFileReader {
                    file,
                    path,
                    position: 0,
                    progress: Some(progress),
                    _guard: guard,
                }))
            }
        }
    }

    async fn open_output(&self, resource: &ConcreteResource) -> TransferResult<Box<dyn ContentWriter>> {
        let path = self.physical_path(resource);
        if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(CacheError::NotAFile {
                path: resource.to_string(),
            }
            .into());
        }
        Self::ensure_parent(&path).await?;

        let guard = self.inner.locks.write(&path).await?;
        let file = fs::File::create(&path).await?;
        Ok(Box::new(LockedFileWriter {
            file: Some(file),
            guard: Some(guard),
            written: 0,
        }))
    }

    async fn delete(&self, resource: &ConcreteResource) -> TransferResult<bool> {
        let path = self.physical_path(resource);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir(&path).await?;
        } else {
            let locks = &self.inner.locks;
            locks.acquire_write(&path).await?;
            let removed = fs::remove_file(&path).await;
            locks.release_write(&path);
            removed?;
        }
        debug!("Deleted {} from file cache", resource);
        Ok(true)
    }

    async fn list(&self, resource: &ConcreteResource) -> TransferResult<Vec<String>> {
        let path = self.physical_path(resource);
        if !fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&path).await?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(EXPIRED_SUFFIX) {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                names.push(format!("{}{}", name, DIRECTORY_MARKER));
            } else {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn mkdirs(&self, resource: &ConcreteResource) -> TransferResult<()> {
        fs::create_dir_all(self.physical_path(resource)).await?;
        Ok(())
    }

    async fn create_file(&self, resource: &ConcreteResource) -> TransferResult<()> {
        let path = self.physical_path(resource);
        Self::ensure_parent(&path).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(())
    }

    async fn copy(&self, from: &ConcreteResource, to: &ConcreteResource) -> TransferResult<()> {
        if from == to {
            return Ok(());
        }
        let mut reader = self.open_input(from).await?;
        let writer = self.open_output(to).await?;
        let bytes = pipe(reader.as_mut(), writer).await?;
        debug!("Copied {} bytes from {} to {}", bytes, from, to);
        Ok(())
    }

    async fn create_alias(&self, target: &ConcreteResource, alias: &ConcreteResource) -> TransferResult<()> {
        let target_path = self.physical_path(target);
        let alias_path = self.physical_path(alias);
        if target_path == alias_path {
            return Ok(());
        }
        Self::ensure_parent(&alias_path).await?;

        let guard = self.inner.locks.write(&alias_path).await?;
        match fs::remove_file(&alias_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = fs::hard_link(&target_path, &alias_path).await {
            debug!("Hard link failed ({}), copying {} to {}", e, target, alias);
            fs::copy(&target_path, &alias_path).await?;
        }
        guard.complete();
        debug!("Aliased {} to {}", alias, target);
        Ok(())
    }

    async fn length(&self, resource: &ConcreteResource) -> TransferResult<Option<u64>> {
        Ok(self
            .metadata(resource)
            .await?
            .filter(|m| m.is_file())
            .map(|m| m.len()))
    }

    async fn last_modified(&self, resource: &ConcreteResource) -> TransferResult<Option<DateTime<Utc>>> {
        match self.metadata(resource).await? {
            Some(metadata) => Ok(Some(DateTime::<Utc>::from(metadata.modified()?))),
            None => Ok(None),
        }
    }

    async fn lock_read(&self, resource: &ConcreteResource) -> TransferResult<()> {
        Ok(self
            .inner
            .locks
            .acquire_read(&self.physical_path(resource))
            .await?)
    }

    fn unlock_read(&self, resource: &ConcreteResource) {
        self.inner.locks.release_read(&self.physical_path(resource));
    }

    async fn lock_write(&self, resource: &ConcreteResource) -> TransferResult<()> {
        Ok(self
            .inner
            .locks
            .acquire_write(&self.physical_path(resource))
            .await?)
    }

    fn unlock_write(&self, resource: &ConcreteResource) {
        self.inner.locks.release_write(&self.physical_path(resource));
    }

    fn is_read_locked(&self, resource: &ConcreteResource) -> bool {
        self.inner.locks.is_read_locked(&self.physical_path(resource))
    }

    fn is_write_locked(&self, resource: &ConcreteResource) -> bool {
        self.inner.locks.is_write_locked(&self.physical_path(resource))
    }

    async fn wait_for_read_unlock(&self, resource: &ConcreteResource) -> TransferResult<()> {
        Ok(self
            .inner
            .locks
            .wait_for_read_unlock(&self.physical_path(resource))
            .await?)
    }

    async fn wait_for_write_unlock(&self, resource: &ConcreteResource) -> TransferResult<()> {
        Ok(self
            .inner
            .locks
            .wait_for_write_unlock(&self.physical_path(resource))
            .await?)
    }
}

/// Reader holding a read lock; tails the file while a joined write is running
struct LockedFileReader {
    file: fs::File,
    path: PathBuf,
    position: u64,
    progress: Option<watch::Receiver<WriteProgress>>,
    _guard: ReadGuard,
}

#[async_trait]
impl ContentReader for LockedFileReader {
    async fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize> {
        loop {
            let n = self.file.read(buf).await?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }

            let Some(progress) = self.progress.as_mut() else {
                return Ok(0);
            };
            let state = *progress.borrow_and_update();
            if state.failed {
                return Err(TransferError::transfer(
                    self.path.display(),
                    "write aborted while reading",
                ));
            }
            if state.done {
                self.progress = None;
                continue;
            }
            if state.written > self.position {
                continue;
            }
            if progress.changed().await.is_err() {
                let state = *progress.borrow();
                if !state.done {
                    return Err(TransferError::transfer(
                        self.path.display(),
                        "writer went away before completing",
                    ));
                }
                self.progress = None;
            }
        }
    }
}

/// Writer holding the exclusive write lock; removes the file if not finished
struct LockedFileWriter {
    file: Option<fs::File>,
    guard: Option<WriteGuard>,
    written: u64,
}

#[async_trait]
impl ContentWriter for LockedFileWriter {
    async fn write_all(&mut self, data: &[u8]) -> TransferResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CacheError::InvalidState {
                reason: "writer already finished".to_string(),
            })?;
        file.write_all(data).await?;
        file.flush().await?;
        self.written += data.len() as u64;
        if let Some(guard) = &self.guard {
            guard.advance(data.len() as u64);
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> TransferResult<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        if let Some(guard) = self.guard.take() {
            guard.complete();
        }
        Ok(self.written)
    }
}

impl Drop for LockedFileWriter {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.file.take();
            if let Err(e) = std::fs::remove_file(guard.path()) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove aborted write {}: {}", guard.path().display(), e);
                }
            }
            debug!("Discarded aborted write {}", guard.path().display());
        }
    }
}
