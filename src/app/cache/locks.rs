//! Per-path read/write coordination
//!
//! The lock manager tracks, for every physical path currently in use, how
//! many readers hold it and whether a writer is active. Writers publish their
//! progress on a `watch` channel so that a reader arriving mid-write can tail
//! the file instead of blocking until the write completes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::trace;

use crate::errors::{CacheError, CacheResult};

/// Progress of an in-flight write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteProgress {
    pub written: u64,
    pub done: bool,
    pub failed: bool,
}

#[derive(Debug, Default)]
struct PathLock {
    readers: usize,
    writer: bool,
    progress: Option<watch::Sender<WriteProgress>>,
}

impl PathLock {
    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer
    }
}

/// Lock table keyed by physical path
#[derive(Debug)]
pub struct LockManager {
    paths: Mutex<HashMap<PathBuf, PathLock>>,
    changed: Notify,
    timeout: Duration,
}

/// How a read lock was granted
pub enum ReadAccess {
    /// No writer was active
    Direct(ReadGuard),
    /// A writer is still streaming into the file
    Joined(ReadGuard, watch::Receiver<WriteProgress>),
}

impl LockManager {
    /// Create a lock manager whose waits give up after `timeout`
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            paths: Mutex::new(HashMap::new()),
            changed: Notify::new(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `ready` holds for the lock state of `path`, then apply it
    async fn wait_until<T>(
        &self,
        path: &Path,
        mut ready: impl FnMut(&mut PathLock) -> Option<T>,
    ) -> CacheResult<T> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut paths = self.paths.lock();
                let entry = paths.entry(path.to_path_buf()).or_default();
                let outcome = ready(entry);
                if entry.is_idle() && entry.progress.is_none() {
                    paths.remove(path);
                }
                if let Some(value) = outcome {
                    return Ok(value);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(CacheError::LockTimeout {
                    path: path.display().to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }
        }
    }

    fn release(&self, path: &Path, update: impl FnOnce(&mut PathLock)) {
        {
            let mut paths = self.paths.lock();
            if let Some(entry) = paths.get_mut(path) {
                update(entry);
                if entry.is_idle() {
                    paths.remove(path);
                }
            }
        }
        self.changed.notify_waiters();
    }

    /// Take a read lock once no writer is active
    pub async fn acquire_read(&self, path: &Path) -> CacheResult<()> {
        self.wait_until(path, |lock| {
            if lock.writer {
                None
            } else {
                lock.readers += 1;
                Some(())
            }
        })
        .await?;
        trace!("Read lock acquired: {}", path.display());
        Ok(())
    }

    pub fn release_read(&self, path: &Path) {
        self.release(path, |lock| lock.readers = lock.readers.saturating_sub(1));
    }

    /// Take the exclusive write lock once no reader or writer holds the path
    pub async fn acquire_write(&self, path: &Path) -> CacheResult<()> {
        self.wait_until(path, |lock| {
            if lock.is_idle() {
                lock.writer = true;
                Some(())
            } else {
                None
            }
        })
        .await?;
        trace!("Write lock acquired: {}", path.display());
        Ok(())
    }

    pub fn release_write(&self, path: &Path) {
        self.release(path, |lock| {
            lock.writer = false;
            lock.progress = None;
        });
    }

    /// Read access that joins an in-progress write when one is streaming
    pub async fn read(self: &Arc<Self>, path: &Path) -> CacheResult<ReadAccess> {
        let joined = self
            .wait_until(path, |lock| match (&lock.progress, lock.writer) {
                (Some(progress), true) => {
                    lock.readers += 1;
                    Some(Some(progress.subscribe()))
                }
                (None, true) => None,
                (_, false) => {
                    lock.readers += 1;
                    Some(None)
                }
            })
            .await?;

        let guard = ReadGuard {
            manager: self.clone(),
            path: path.to_path_buf(),
        };
        Ok(match joined {
            Some(progress) => {
                trace!("Joined in-progress write: {}", path.display());
                ReadAccess::Joined(guard, progress)
            }
            None => ReadAccess::Direct(guard),
        })
    }

    /// Exclusive write access that publishes its progress to joining readers
    pub async fn write(self: &Arc<Self>, path: &Path) -> CacheResult<WriteGuard> {
        let progress = self
            .wait_until(path, |lock| {
                if lock.is_idle() {
                    let (sender, _) = watch::channel(WriteProgress::default());
                    lock.writer = true;
                    lock.progress = Some(sender.clone());
                    Some(sender)
                } else {
                    None
                }
            })
            .await?;

        Ok(WriteGuard {
            manager: self.clone(),
            path: path.to_path_buf(),
            progress,
            completed: false,
        })
    }

    pub fn is_read_locked(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .get(path)
            .map(|lock| lock.readers > 0)
            .unwrap_or(false)
    }

    pub fn is_write_locked(&self, path: &Path) -> bool {
        self.paths
            .lock()
            .get(path)
            .map(|lock| lock.writer)
            .unwrap_or(false)
    }

    pub async fn wait_for_read_unlock(&self, path: &Path) -> CacheResult<()> {
        self.wait_until(path, |lock| (lock.readers == 0).then_some(()))
            .await
    }

    pub async fn wait_for_write_unlock(&self, path: &Path) -> CacheResult<()> {
        self.wait_until(path, |lock| (!lock.writer).then_some(()))
            .await
    }
}

/// Read lock released on drop
#[derive(Debug)]
pub struct ReadGuard {
    manager: Arc<LockManager>,
    path: PathBuf,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.manager.release_read(&self.path);
    }
}

/// Write lock released on drop; a guard dropped before `complete` marks the
/// write as failed for any joined reader
#[derive(Debug)]
pub struct WriteGuard {
    manager: Arc<LockManager>,
    path: PathBuf,
    progress: watch::Sender<WriteProgress>,
    completed: bool,
}

impl WriteGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `n` more bytes written
    pub fn advance(&self, n: u64) {
        self.progress.send_modify(|p| p.written += n);
    }

    /// Mark the write as successfully finished
    pub fn complete(mut self) {
        self.completed = true;
        self.progress.send_modify(|p| p.done = true);
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.progress.send_modify(|p| p.failed = true);
        }
        self.manager.release_write(&self.path);
    }
}
