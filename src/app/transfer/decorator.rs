//! Pluggable transfer decorators
//!
//! Decorators are applied in registration order. Stream decorators wrap the
//! provider's reader/writer; `decorate_exists` may return a definitive answer
//! which short-circuits the remaining decorators and the provider.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::app::cache::CacheProvider;
use crate::app::resource::ConcreteResource;
use crate::constants::files::MD5_SUFFIX;
use crate::errors::TransferResult;

use super::handle::Transfer;
use super::stream::{ContentReader, ContentWriter};

/// Hook points around transfer operations
#[async_trait]
pub trait TransferDecorator: Send + Sync + Debug {
    /// `Some(answer)` settles existence without consulting the provider
    async fn decorate_exists(&self, _transfer: &Transfer) -> TransferResult<Option<bool>> {
        Ok(None)
    }

    fn decorate_read(
        &self,
        _transfer: &Transfer,
        reader: Box<dyn ContentReader>,
    ) -> Box<dyn ContentReader> {
        reader
    }

    fn decorate_write(
        &self,
        _transfer: &Transfer,
        writer: Box<dyn ContentWriter>,
    ) -> Box<dyn ContentWriter> {
        writer
    }

    /// Runs before the provider deletes the resource
    async fn decorate_delete(&self, _transfer: &Transfer) -> TransferResult<()> {
        Ok(())
    }

    async fn decorate_list(
        &self,
        _transfer: &Transfer,
        entries: Vec<String>,
    ) -> TransferResult<Vec<String>> {
        Ok(entries)
    }

    async fn decorate_mkdirs(&self, _transfer: &Transfer) -> TransferResult<()> {
        Ok(())
    }
}

/// Maintains `.md5` sidecars next to written content
///
/// Sidecars are written straight through the provider so that they never pass
/// through the decorator chain themselves.
#[derive(Debug, Default)]
pub struct ChecksumDecorator;

impl ChecksumDecorator {
    pub fn new() -> Self {
        Self
    }

    fn is_sidecar(resource: &ConcreteResource) -> bool {
        resource.path().ends_with(MD5_SUFFIX)
    }
}

#[async_trait]
impl TransferDecorator for ChecksumDecorator {
    async fn decorate_exists(&self, transfer: &Transfer) -> TransferResult<Option<bool>> {
        let resource = transfer.resource();
        if !Self::is_sidecar(resource) {
            return Ok(None);
        }
        let primary_path = resource.path().trim_end_matches(MD5_SUFFIX);
        let primary = ConcreteResource::new(resource.location().clone(), primary_path);
        let provider = transfer.registry().provider();
        if provider.exists(&primary).await? {
            Ok(None)
        } else {
            Ok(Some(false))
        }
    }

    fn decorate_write(
        &self,
        transfer: &Transfer,
        writer: Box<dyn ContentWriter>,
    ) -> Box<dyn ContentWriter> {
        if Self::is_sidecar(transfer.resource()) {
            return writer;
        }
        Box::new(ChecksumWriter {
            inner: writer,
            context: md5::Context::new(),
            provider: transfer.registry().provider().clone(),
            sidecar: transfer.resource().with_suffix(MD5_SUFFIX),
        })
    }

    async fn decorate_delete(&self, transfer: &Transfer) -> TransferResult<()> {
        if Self::is_sidecar(transfer.resource()) {
            return Ok(());
        }
        let sidecar = transfer.resource().with_suffix(MD5_SUFFIX);
        let provider = transfer.registry().provider();
        if provider.is_file(&sidecar).await? {
            provider.delete(&sidecar).await?;
            debug!("Removed checksum sidecar {}", sidecar);
        }
        Ok(())
    }
}

struct ChecksumWriter {
    inner: Box<dyn ContentWriter>,
    context: md5::Context,
    provider: Arc<dyn CacheProvider>,
    sidecar: ConcreteResource,
}

#[async_trait]
impl ContentWriter for ChecksumWriter {
    async fn write_all(&mut self, data: &[u8]) -> TransferResult<()> {
        self.inner.write_all(data).await?;
        self.context.consume(data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> TransferResult<u64> {
        let ChecksumWriter {
            inner,
            context,
            provider,
            sidecar,
        } = *self;
        let written = inner.finish().await?;
        let digest = format!("{:x}", context.compute());

        let result = async {
            let mut out = provider.open_output(&sidecar).await?;
            out.write_all(digest.as_bytes()).await?;
            out.finish().await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to write checksum sidecar {}: {}", sidecar, e);
        }
        Ok(written)
    }
}
