//! Transport for `file://` locations
//!
//! Treats a local directory as a remote origin. Useful for staging
//! repositories and for tests.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use url::Url;

use super::{ListingResult, Transport, TransportJob};
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::Transfer;
use crate::constants::files::{CHUNK_SIZE, DIRECTORY_MARKER};
use crate::errors::{TransferError, TransferResult};

/// Transport reading from and publishing to local directories
#[derive(Debug, Default, Clone)]
pub struct FileTransport;

impl FileTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Local path behind `url`
fn local_path(url: &str, resource: &ConcreteResource) -> TransferResult<PathBuf> {
    let parsed = Url::parse(url)
        .map_err(|e| TransferError::location(resource.location().name(), e.to_string()))?;
    parsed.to_file_path().map_err(|_| {
        TransferError::location(
            resource.location().name(),
            format!("{} is not a local file URL", url),
        )
    })
}

async fn with_timeout<T>(
    url: &str,
    timeout: Duration,
    work: impl std::future::Future<Output = TransferResult<T>>,
) -> TransferResult<T> {
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| TransferError::Timeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        })?
}

impl Transport for FileTransport {
    fn name(&self) -> &'static str {
        "file"
    }

    fn handles(&self, location: &Location) -> bool {
        location.scheme() == Some("file")
    }

    fn create_download_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        target: Transfer,
        timeout: Duration,
    ) -> Box<dyn TransportJob<Option<Transfer>>> {
        Box::new(FileDownloadJob {
            url: url.to_string(),
            resource: resource.clone(),
            target,
            timeout,
        })
    }

    fn create_listing_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        timeout: Duration,
    ) -> Box<dyn TransportJob<Option<ListingResult>>> {
        Box::new(FileListingJob {
            url: url.to_string(),
            resource: resource.clone(),
            timeout,
        })
    }

    fn create_existence_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        timeout: Duration,
    ) -> Box<dyn TransportJob<bool>> {
        Box::new(FileExistenceJob {
            url: url.to_string(),
            resource: resource.clone(),
            timeout,
        })
    }

    fn create_publish_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        source: Transfer,
        timeout: Duration,
    ) -> Box<dyn TransportJob<bool>> {
        Box::new(FilePublishJob {
            url: url.to_string(),
            resource: resource.clone(),
            source,
            timeout,
        })
    }
}

struct FileDownloadJob {
    url: String,
    resource: ConcreteResource,
    target: Transfer,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<Option<Transfer>> for FileDownloadJob {
    async fn call(self: Box<Self>) -> TransferResult<Option<Transfer>> {
        let FileDownloadJob {
            url,
            resource,
            target,
            timeout,
        } = *self;
        let path = local_path(&url, &resource)?;

        with_timeout(&url, timeout, async move {
            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => return Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let mut source = fs::File::open(&path).await?;
            let mut writer = target.open_output().await?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = source.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                writer.write_all(&buf[..n]).await?;
            }
            let bytes = writer.finish().await?;
            debug!("Copied {} bytes from {} into {}", bytes, path.display(), target);
            Ok(Some(target))
        })
        .await
    }
}

struct FileListingJob {
    url: String,
    resource: ConcreteResource,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<Option<ListingResult>> for FileListingJob {
    async fn call(self: Box<Self>) -> TransferResult<Option<ListingResult>> {
        let path = local_path(&self.url, &self.resource)?;
        let resource = self.resource.clone();

        with_timeout(&self.url, self.timeout, async move {
            if !fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
                return Ok(None);
            }
            let mut entries = fs::read_dir(&path).await?;
            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await?.is_dir() {
                    names.push(format!("{}{}", name, DIRECTORY_MARKER));
                } else {
                    names.push(name);
                }
            }
            names.sort();
            Ok(Some(ListingResult::new(resource, names)))
        })
        .await
    }
}

struct FileExistenceJob {
    url: String,
    resource: ConcreteResource,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<bool> for FileExistenceJob {
    async fn call(self: Box<Self>) -> TransferResult<bool> {
        let path = local_path(&self.url, &self.resource)?;
        with_timeout(&self.url, self.timeout, async move {
            Ok(fs::metadata(&path).await.is_ok())
        })
        .await
    }
}

struct FilePublishJob {
    url: String,
    resource: ConcreteResource,
    source: Transfer,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<bool> for FilePublishJob {
    async fn call(self: Box<Self>) -> TransferResult<bool> {
        let path = local_path(&self.url, &self.resource)?;
        let source = self.source;

        with_timeout(&self.url, self.timeout, async move {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let mut reader = source.open_input().await?;
            let mut out = fs::File::create(&path).await?;
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await?;
            }
            out.flush().await?;
            debug!("Published {} to {}", source, path.display());
            Ok(true)
        })
        .await
    }
}
