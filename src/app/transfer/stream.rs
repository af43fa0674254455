//! Content streams handed out by cache providers
//!
//! Readers and writers are boxed trait objects so that providers and
//! decorators can wrap each other freely. A writer that is dropped without
//! `finish` is treated as aborted: the provider discards whatever it wrote.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::constants::files::CHUNK_SIZE;
use crate::errors::TransferResult;

/// Sequential reader over cached content
#[async_trait]
pub trait ContentReader: Send {
    /// Read up to `buf.len()` bytes, returning 0 at end of content
    async fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize>;

    /// Drain the remaining content into memory
    async fn read_to_end(&mut self) -> TransferResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

/// Sequential writer into cache storage
#[async_trait]
pub trait ContentWriter: Send {
    /// Append `data`
    async fn write_all(&mut self, data: &[u8]) -> TransferResult<()>;

    /// Commit the written content, returning the total byte count
    async fn finish(self: Box<Self>) -> TransferResult<u64>;
}

/// Reader over an in-memory buffer
#[derive(Debug, Default)]
pub struct BytesReader {
    data: Vec<u8>,
    position: usize,
}

impl BytesReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }
}

#[async_trait]
impl ContentReader for BytesReader {
    async fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize> {
        let remaining = &self.data[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Reader over a plain file on disk
#[derive(Debug)]
pub struct FileReader {
    file: tokio::fs::File,
}

impl FileReader {
    pub fn new(file: tokio::fs::File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ContentReader for FileReader {
    async fn read(&mut self, buf: &mut [u8]) -> TransferResult<usize> {
        Ok(self.file.read(buf).await?)
    }
}

/// Copy everything from `reader` into `writer` and commit it
pub async fn pipe(
    reader: &mut dyn ContentReader,
    mut writer: Box<dyn ContentWriter>,
) -> TransferResult<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
    }
    writer.finish().await
}

/// Write `data` to a freshly created file, flushing before returning
pub(crate) async fn write_file(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await
}
