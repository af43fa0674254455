//! Path-mapped store behaviour tests

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use crate::app::cache::CacheProvider;
use crate::app::mapped::{
    BlobStore, ContentId, PathDb, PathKey, PathMap, PathMappedCache, PathMappedConfig,
};
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::TransferRegistry;

async fn create_test_store() -> (PathMappedCache, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = PathMappedConfig::with_root(temp_dir.path().to_path_buf())
        .with_gc_grace_period(Duration::from_secs(3600));
    let store = PathMappedCache::new(config).await.unwrap();
    (store, temp_dir)
}

fn location() -> Arc<Location> {
    Arc::new(Location::new("central", "https://repo.example.org/maven2").with_cache_timeout(60))
}

fn resource(path: &str) -> ConcreteResource {
    ConcreteResource::new(location(), path)
}

async fn write(store: &PathMappedCache, r: &ConcreteResource, data: &[u8]) {
    let mut writer = store.open_output(r).await.unwrap();
    writer.write_all(data).await.unwrap();
    writer.finish().await.unwrap();
}

fn content_id_of(store: &PathMappedCache, r: &ConcreteResource) -> ContentId {
    store.entry(r).unwrap().unwrap().content_id.unwrap()
}

/// Test write, read and directory materialization
///
/// Verifies that a finished write is readable, sized correctly and that its
/// ancestor directories appear in listings with a trailing marker.
#[tokio::test]
async fn test_write_read_and_list() {
    let (store, _temp) = create_test_store().await;
    let r = resource("/org/foo/foo-1.0.jar");

    write(&store, &r, b"jar bytes").await;

    assert!(store.is_file(&r).await.unwrap());
    assert_eq!(store.length(&r).await.unwrap(), Some(9));
    let mut reader = store.open_input(&r).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"jar bytes");

    assert!(store.is_directory(&resource("/org/foo")).await.unwrap());
    assert_eq!(
        store.list(&resource("/")).await.unwrap(),
        vec!["org/".to_string()]
    );
    assert_eq!(
        store.list(&resource("/org/foo")).await.unwrap(),
        vec!["foo-1.0.jar".to_string()]
    );

    let content_id = content_id_of(&store, &r);
    assert!(store.blobs().exists(&content_id.storage_pointer()).await);
}

/// Test that writes only become visible on a clean finish
///
/// Verifies that a writer dropped mid-stream records nothing and leaves no
/// blob behind.
#[tokio::test]
async fn test_unfinished_write_leaves_nothing() {
    let (store, temp) = create_test_store().await;
    let r = resource("/partial.bin");

    let mut writer = store.open_output(&r).await.unwrap();
    writer.write_all(b"half").await.unwrap();
    assert!(!store.exists(&r).await.unwrap());
    drop(writer);

    assert!(!store.exists(&r).await.unwrap());

    // removal of the aborted blob runs on the blocking pool
    let mut blobs = Vec::new();
    for _ in 0..50 {
        blobs = blob_files(&temp.path().join("blobs"));
        if blobs.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(blobs.is_empty(), "leftover blobs: {:?}", blobs);
}

fn blob_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut blobs = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                stack.push(entry.path());
            } else {
                blobs.push(entry.path());
            }
        }
    }
    blobs
}

/// Test content sharing through copy
///
/// Verifies that a copy shares the source's content id and blob, and that
/// the copy stays readable after the source is deleted.
#[tokio::test]
async fn test_copy_shares_blob() {
    let (store, _temp) = create_test_store().await;
    let p1 = resource("/a/p1.jar");
    let p2 = resource("/b/p2.jar");
    write(&store, &p1, b"shared").await;

    store.copy(&p1, &p2).await.unwrap();
    let id1 = content_id_of(&store, &p1);
    let id2 = content_id_of(&store, &p2);
    assert_eq!(id1, id2);
    assert_eq!(store.db().references(&id1).unwrap().len(), 2);

    assert!(store.delete(&p1).await.unwrap());
    assert!(!store.exists(&p1).await.unwrap());
    assert!(store.db().pending_reclaims().unwrap().is_empty());

    let mut reader = store.open_input(&p2).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"shared");
}

/// Test that rewriting a path gets a fresh blob
///
/// Verifies that identical bytes written to two paths are stored twice and
/// that overwriting a path queues the old blob.
#[tokio::test]
async fn test_rewrite_allocates_new_content() {
    let (store, _temp) = create_test_store().await;
    let a = resource("/same-a");
    let b = resource("/same-b");
    write(&store, &a, b"same").await;
    write(&store, &b, b"same").await;
    assert_ne!(content_id_of(&store, &a), content_id_of(&store, &b));

    let old = content_id_of(&store, &a);
    write(&store, &a, b"newer").await;
    assert_ne!(content_id_of(&store, &a), old);

    let pending = store.db().pending_reclaims().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content_id, old);
}

/// Test reclaim respects the grace period
///
/// Verifies that deleting the last reference queues the blob, a sweep
/// before the grace period keeps it, and a later sweep deletes it together
/// with its reclaim record.
#[tokio::test]
async fn test_reclaim_after_grace_period() {
    let (store, _temp) = create_test_store().await;
    let r = resource("/gone.jar");
    write(&store, &r, b"bytes").await;
    let content_id = content_id_of(&store, &r);
    let pointer = content_id.storage_pointer();

    store.delete(&r).await.unwrap();
    assert!(store.blobs().exists(&pointer).await);
    assert_eq!(store.db().pending_reclaims().unwrap().len(), 1);

    let report = store.gc_expired().await.unwrap();
    assert_eq!(report.examined, 0);
    assert!(store.blobs().exists(&pointer).await);
    assert_eq!(store.db().pending_reclaims().unwrap().len(), 1);

    let report = store
        .gc(Utc::now() + chrono::Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.failed, 0);
    assert!(!store.blobs().exists(&pointer).await);
    assert!(store.db().pending_reclaims().unwrap().is_empty());
}

/// Test that a failed blob deletion is retried later
///
/// Verifies that the reclaim record survives a failing physical delete and
/// is cleared by the next successful sweep.
#[tokio::test]
async fn test_failed_reclaim_keeps_record() {
    let (store, _temp) = create_test_store().await;
    let r = resource("/stuck.jar");
    write(&store, &r, b"bytes").await;
    let pointer = content_id_of(&store, &r).storage_pointer();
    store.delete(&r).await.unwrap();

    // a directory in place of the blob makes the delete fail
    let blob_path = store.blobs().path_for(&pointer);
    std::fs::remove_file(&blob_path).unwrap();
    std::fs::create_dir(&blob_path).unwrap();

    let later = Utc::now() + chrono::Duration::hours(2);
    let report = store.gc(later).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(store.db().pending_reclaims().unwrap().len(), 1);

    std::fs::remove_dir(&blob_path).unwrap();
    let report = store.gc(later).await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert!(store.db().pending_reclaims().unwrap().is_empty());
}

/// Test asynchronous eviction of expired entries
///
/// Verifies that creating a transfer handle for an entry older than its
/// location's timeout schedules its removal.
#[tokio::test]
async fn test_expired_entry_evicted_on_handle_creation() {
    let temp_dir = TempDir::new().unwrap();
    let config = PathMappedConfig::with_root(temp_dir.path().to_path_buf());
    let db = PathDb::open_in_memory().unwrap();
    let blobs = BlobStore::new(temp_dir.path().join("blobs")).await.unwrap();
    let store = PathMappedCache::from_parts(db, blobs, config);

    let r = resource("/old.pom");
    let key = PathKey::new("central", "/old.pom");
    let content_id = ContentId::generate("central", "/old.pom");
    let mut file = store
        .blobs()
        .create(&content_id.storage_pointer())
        .await
        .unwrap();
    file.write_all(b"old").await.unwrap();
    file.flush().await.unwrap();

    let mut map = PathMap::file(key, content_id, 3);
    map.creation = Utc::now() - chrono::Duration::hours(2);
    store.db().insert(&map).unwrap();
    assert!(store.exists(&r).await.unwrap());

    let registry = TransferRegistry::new(Arc::new(store.clone()));
    let _transfer = registry.get_transfer(&r);

    let mut evicted = false;
    for _ in 0..50 {
        if !store.exists(&r).await.unwrap() {
            evicted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(evicted, "expired entry should be evicted");
    assert_eq!(store.db().pending_reclaims().unwrap().len(), 1);

    // fresh entries survive
    let fresh = resource("/fresh.pom");
    write(&store, &fresh, b"new").await;
    assert!(!store.evict_if_expired(&fresh).await.unwrap());
}

/// Test eviction against a rewritten entry
///
/// Verifies that an expiry decision taken on an old read does not remove a
/// write that landed at the same path afterwards.
#[tokio::test]
async fn test_eviction_spares_rewritten_entry() {
    let (store, _temp) = create_test_store().await;
    let r = resource("/org/foo/maven-metadata.xml");

    write(&store, &r, b"old metadata").await;
    let mut stale = store.entry(&r).unwrap().unwrap();
    stale.creation = Utc::now() - chrono::Duration::hours(2);

    write(&store, &r, b"new metadata").await;
    let fresh_id = content_id_of(&store, &r);
    assert_ne!(Some(fresh_id), stale.content_id);

    assert!(!store.evict_stale(&r, &stale).await.unwrap());
    assert_eq!(content_id_of(&store, &r), fresh_id);
    let mut reader = store.open_input(&r).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"new metadata");
    assert!(!store
        .db()
        .pending_reclaims()
        .unwrap()
        .iter()
        .any(|reclaim| reclaim.content_id == fresh_id));

    // the same decision on the current entry does evict it
    let mut current = store.entry(&r).unwrap().unwrap();
    current.creation = Utc::now() - chrono::Duration::hours(2);
    assert!(store.evict_stale(&r, &current).await.unwrap());
    assert!(store.entry(&r).unwrap().is_none());
}

/// Test database access from the blocking pool
///
/// Verifies that database work routed off the runtime returns results and
/// surfaces database errors to the caller.
#[tokio::test(flavor = "current_thread")]
async fn test_database_work_runs_off_runtime() {
    let (store, _temp) = create_test_store().await;
    write(&store, &resource("/a"), b"file").await;

    let listed = store
        .with_db(|db| db.list(&PathKey::new("central", "/")))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let blocked = store
        .with_db(|db| db.mkdirs(&PathKey::new("central", "/a/b")))
        .await;
    assert!(blocked.is_err());
}

/// Test alias creation and directory rules
///
/// Verifies that an alias shares content with its target and that writing
/// over a directory is rejected.
#[tokio::test]
async fn test_alias_and_directory_rules() {
    let (store, _temp) = create_test_store().await;
    let target = resource("/redirected/a.jar");
    let alias = resource("/requested/a.jar");
    write(&store, &target, b"moved").await;

    store.create_alias(&target, &alias).await.unwrap();
    assert_eq!(content_id_of(&store, &target), content_id_of(&store, &alias));

    store.mkdirs(&resource("/dir/sub")).await.unwrap();
    assert!(store.is_directory(&resource("/dir")).await.unwrap());
    assert!(store.open_output(&resource("/dir/sub")).await.is_err());
    assert!(store.delete(&resource("/dir")).await.is_err());

    store.create_file(&resource("/dir/sub/empty")).await.unwrap();
    assert_eq!(
        store.length(&resource("/dir/sub/empty")).await.unwrap(),
        Some(0)
    );
}

/// Test the background reclaimer shuts down cleanly
#[tokio::test]
async fn test_reclaimer_runs_and_stops() {
    let temp_dir = TempDir::new().unwrap();
    let config = PathMappedConfig::with_root(temp_dir.path().to_path_buf())
        .with_gc_grace_period(Duration::ZERO);
    let store = PathMappedCache::new(config).await.unwrap();

    let r = resource("/tmp.bin");
    write(&store, &r, b"x").await;
    store.delete(&r).await.unwrap();

    let reclaimer = crate::app::mapped::Reclaimer::spawn(store.clone(), Duration::from_millis(20));
    let mut cleared = false;
    for _ in 0..50 {
        if store.db().pending_reclaims().unwrap().is_empty() {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    reclaimer.shutdown().await;
    assert!(cleared);
}
