//! File cache behaviour tests

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::app::cache::{CacheProvider, FileCache, FileCacheConfig};
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::{ChecksumDecorator, TransferRegistry};

async fn create_test_cache() -> (FileCache, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = FileCacheConfig::with_cache_root(temp_dir.path().to_path_buf())
        .with_lock_timeout(Duration::from_secs(2));
    let cache = FileCache::new(config).await.unwrap();
    (cache, temp_dir)
}

fn location() -> Arc<Location> {
    Arc::new(Location::new("central", "https://repo.example.org/maven2").with_cache_timeout(60))
}

fn resource(path: &str) -> ConcreteResource {
    ConcreteResource::new(location(), path)
}

/// Test basic write, read and metadata round trip
///
/// Verifies that content written through a writer is readable afterwards
/// and reported with the right length.
#[tokio::test]
async fn test_write_then_read() {
    let (cache, _temp) = create_test_cache().await;
    let r = resource("/org/foo/foo.pom");

    assert!(!cache.exists(&r).await.unwrap());

    let mut writer = cache.open_output(&r).await.unwrap();
    writer.write_all(b"<project/>").await.unwrap();
    assert_eq!(writer.finish().await.unwrap(), 10);

    assert!(cache.exists(&r).await.unwrap());
    assert!(cache.is_file(&r).await.unwrap());
    assert_eq!(cache.length(&r).await.unwrap(), Some(10));
    assert!(cache.last_modified(&r).await.unwrap().is_some());

    let mut reader = cache.open_input(&r).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"<project/>");

    let parent = resource("/org/foo");
    assert!(cache.is_directory(&parent).await.unwrap());
    assert!(cache.physical_path(&r).starts_with(cache.location_dir(r.location())));
}

/// Test that an abandoned writer leaves nothing behind
///
/// Verifies that dropping a writer without finishing removes the partial
/// file and releases the write lock.
#[tokio::test]
async fn test_aborted_write_is_discarded() {
    let (cache, _temp) = create_test_cache().await;
    let r = resource("/partial.bin");

    let mut writer = cache.open_output(&r).await.unwrap();
    writer.write_all(b"half").await.unwrap();
    assert!(cache.is_write_locked(&r));
    drop(writer);

    assert!(!cache.is_write_locked(&r));
    assert!(!cache.exists(&r).await.unwrap());
}

/// Test that a reader joins a write in progress
///
/// Verifies that a reader opened while a writer is still streaming receives
/// the complete content once the writer finishes.
#[tokio::test]
async fn test_reader_joins_in_progress_write() {
    let (cache, _temp) = create_test_cache().await;
    let r = resource("/streaming.bin");

    let mut writer = cache.open_output(&r).await.unwrap();
    writer.write_all(b"first ").await.unwrap();

    let reader_task = {
        let cache = cache.clone();
        let r = r.clone();
        tokio::spawn(async move {
            let mut reader = cache.open_input(&r).await.unwrap();
            reader.read_to_end().await.unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    writer.write_all(b"second").await.unwrap();
    writer.finish().await.unwrap();

    let content = reader_task.await.unwrap();
    assert_eq!(content, b"first second");
}

/// Test that a joined reader sees an aborted write as an error
#[tokio::test]
async fn test_joined_reader_sees_abort() {
    let (cache, _temp) = create_test_cache().await;
    let r = resource("/doomed.bin");

    let mut writer = cache.open_output(&r).await.unwrap();
    writer.write_all(b"partial").await.unwrap();

    let mut reader = cache.open_input(&r).await.unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(reader.read(&mut buf).await.unwrap(), 7);

    drop(writer);
    assert!(reader.read(&mut buf).await.is_err());
}

/// Test age-based expiry
///
/// Verifies that a file older than its location's timeout is renamed aside
/// and deleted on access instead of being served.
#[tokio::test]
async fn test_stale_file_is_expired_on_access() {
    let (cache, _temp) = create_test_cache().await;
    let r = resource("/old.jar");

    let mut writer = cache.open_output(&r).await.unwrap();
    writer.write_all(b"stale").await.unwrap();
    writer.finish().await.unwrap();

    let path = cache.physical_path(&r);
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
        .unwrap();
    drop(file);

    assert!(!cache.exists(&r).await.unwrap());
    assert!(!path.exists());
    let parent_entries = cache.list(&resource("/")).await.unwrap();
    assert!(parent_entries.is_empty());
}

/// Test that directories never expire
#[tokio::test]
async fn test_directories_do_not_expire() {
    let (cache, _temp) = create_test_cache().await;
    let dir = resource("/org/old");
    cache.mkdirs(&dir).await.unwrap();

    let path = cache.physical_path(&dir);
    let handle = std::fs::File::open(&path).unwrap();
    handle
        .set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
        .unwrap();
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert!(modified < SystemTime::now() - Duration::from_secs(60 * 60));

    assert!(cache.is_directory(&dir).await.unwrap());
}

/// Test directory listing markers
#[tokio::test]
async fn test_list_marks_directories() {
    let (cache, _temp) = create_test_cache().await;
    cache.mkdirs(&resource("/org/foo")).await.unwrap();
    cache.create_file(&resource("/org/readme.txt")).await.unwrap();

    let entries = cache.list(&resource("/org")).await.unwrap();
    assert_eq!(entries, vec!["foo/".to_string(), "readme.txt".to_string()]);
    assert!(cache.list(&resource("/missing")).await.unwrap().is_empty());
}

/// Test deletion of files and directories
#[tokio::test]
async fn test_delete() {
    let (cache, _temp) = create_test_cache().await;
    let dir = resource("/org");
    let file = resource("/org/a.txt");
    cache.create_file(&file).await.unwrap();

    assert!(cache.delete(&dir).await.is_err());
    assert!(cache.delete(&file).await.unwrap());
    assert!(!cache.delete(&file).await.unwrap());
    assert!(cache.delete(&dir).await.unwrap());
}

/// Test copy and alias creation
///
/// Verifies that both produce an independent readable entry at the
/// destination with identical bytes.
#[tokio::test]
async fn test_copy_and_alias() {
    let (cache, _temp) = create_test_cache().await;
    let source = resource("/a/source.bin");
    let mut writer = cache.open_output(&source).await.unwrap();
    writer.write_all(b"payload").await.unwrap();
    writer.finish().await.unwrap();

    let copy = resource("/b/copy.bin");
    cache.copy(&source, &copy).await.unwrap();
    let mut reader = cache.open_input(&copy).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"payload");

    let other = Arc::new(Location::new("mirror", "https://mirror.example.org"));
    let alias = ConcreteResource::new(other, "/a/source.bin");
    cache.create_alias(&source, &alias).await.unwrap();
    let mut reader = cache.open_input(&alias).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"payload");
}

/// Test explicit lock operations
#[tokio::test]
async fn test_explicit_locks() {
    let (cache, _temp) = create_test_cache().await;
    let r = resource("/locked.txt");

    cache.lock_read(&r).await.unwrap();
    assert!(cache.is_read_locked(&r));
    cache.unlock_read(&r);
    cache.wait_for_read_unlock(&r).await.unwrap();

    cache.lock_write(&r).await.unwrap();
    assert!(cache.is_write_locked(&r));
    cache.unlock_write(&r);
    cache.wait_for_write_unlock(&r).await.unwrap();
    assert!(!cache.is_write_locked(&r));
}

/// Test handle identity and the checksum decorator
///
/// Verifies that the registry returns the same handle for the same resource
/// and that writing through the decorator produces an `.md5` sidecar that
/// is removed again on delete.
#[tokio::test]
async fn test_registry_identity_and_checksum_sidecar() {
    let (cache, _temp) = create_test_cache().await;
    let registry =
        TransferRegistry::with_decorators(Arc::new(cache), vec![Arc::new(ChecksumDecorator::new())]);

    let transfer = registry.get_transfer(&resource("/org/foo/foo.jar"));
    let same = registry.get_transfer(&resource("org//foo/foo.jar"));
    assert!(transfer.ptr_eq(&same));

    transfer.write_bytes(b"hello").await.unwrap();
    let sidecar = transfer.sibling_with_suffix(".md5");
    assert!(sidecar.exists().await.unwrap());
    let digest = String::from_utf8(sidecar.read_to_vec().await.unwrap()).unwrap();
    assert_eq!(digest, format!("{:x}", md5::compute(b"hello")));

    assert!(transfer.delete().await.unwrap());
    assert!(!sidecar.exists().await.unwrap());
    assert_eq!(transfer.parent().unwrap().path(), "/org/foo");
}
