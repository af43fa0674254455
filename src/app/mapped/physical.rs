//! Physical blob storage addressed by storage pointers

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::{CacheError, CacheResult};

/// Directory of blobs laid out as `<root>/ab/cd/<content id>`
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create the blob directory if needed
    pub async fn new(root: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&root)
            .await
            .map_err(|_| CacheError::DirectoryNotAccessible { path: root.clone() })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a blob
    pub fn path_for(&self, pointer: &str) -> PathBuf {
        self.root.join(pointer)
    }

    /// Create an empty blob for writing, replacing any leftover
    pub async fn create(&self, pointer: &str) -> CacheResult<fs::File> {
        let path = self.path_for(pointer);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(fs::File::create(&path).await?)
    }

    pub async fn open(&self, pointer: &str) -> CacheResult<fs::File> {
        match fs::File::open(self.path_for(pointer)).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CacheError::NotFound {
                path: pointer.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, pointer: &str) -> bool {
        fs::metadata(self.path_for(pointer)).await.is_ok()
    }

    /// Delete a blob; a blob that is already gone counts as deleted
    pub async fn delete(&self, pointer: &str) -> CacheResult<()> {
        match fs::remove_file(self.path_for(pointer)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking delete for use from `Drop`
    pub fn delete_now(&self, pointer: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.path_for(pointer)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
