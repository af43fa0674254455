//! Integration tests for the path-mapped store behind the transfer manager
//!
//! These tests verify that downloads, stores, copies and deletes issued
//! through the manager keep the path database and the blob directory in
//! step, and that reclaim honours the grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use depot_transfer::app::mapped::{ContentId, PathMappedCache, PathMappedConfig};
use depot_transfer::app::manager::TransferManager;
use depot_transfer::app::resource::{ConcreteResource, Location, VirtualResource};
use depot_transfer::app::transfer::{ChecksumDecorator, TransferRegistry};
use depot_transfer::app::transport::{MemoryTransport, TransportRegistry};
use depot_transfer::app::worker::ConfigPresets;
use tempfile::TempDir;
use tokio_test::assert_ok;

async fn create_manager(
    transport: &MemoryTransport,
) -> (TransferManager, PathMappedCache, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = PathMappedConfig::with_root(temp_dir.path().to_path_buf())
        .with_gc_grace_period(Duration::from_secs(3600));
    let store = PathMappedCache::new(config).await.unwrap();
    let manager = TransferManager::builder(
        TransferRegistry::with_decorators(
            Arc::new(store.clone()),
            vec![Arc::new(ChecksumDecorator::new())],
        ),
        TransportRegistry::new().with_transport(Arc::new(transport.clone())),
    )
    .pool_config(ConfigPresets::testing())
    .build()
    .unwrap();
    (manager, store, temp_dir)
}

fn central() -> Arc<Location> {
    Arc::new(Location::new("central", "mem://central"))
}

/// Test downloads land in the path database
///
/// Verifies that a retrieved resource is recorded with its size, backed by
/// a blob, and accompanied by a checksum sidecar entry.
#[tokio::test]
async fn test_download_into_path_mapped_store() {
    let transport = MemoryTransport::new();
    let (manager, store, _temp) = create_manager(&transport).await;
    let resource = ConcreteResource::new(central(), "/org/foo/1.0/foo-1.0.jar");
    transport.put(&resource, b"remote jar".to_vec());

    let transfer = assert_ok!(manager.retrieve(&resource, false).await).unwrap();
    assert_eq!(assert_ok!(transfer.read_to_vec().await), b"remote jar");

    let entry = store.entry(&resource).unwrap().unwrap();
    assert_eq!(entry.size, 10);
    let content_id = entry.content_id.unwrap();
    assert!(store.blobs().exists(&content_id.storage_pointer()).await);

    let sidecar = resource.with_suffix(".md5");
    let checksum = manager
        .get_cache_reference(&sidecar)
        .read_to_vec()
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(checksum).unwrap().trim(),
        format!("{:x}", md5::compute(b"remote jar"))
    );

    let listing = manager
        .list(&ConcreteResource::new(central(), "/org/foo/1.0"))
        .await
        .unwrap();
    assert_eq!(listing, vec!["foo-1.0.jar", "foo-1.0.jar.md5"]);
}

/// Test copy sharing and reclaim through the manager
///
/// Verifies that a copy shares one blob, that deleting both paths queues
/// the blob for reclaim, and that only a sweep past the grace period
/// removes it.
#[tokio::test]
async fn test_copy_delete_and_reclaim() {
    let transport = MemoryTransport::new();
    let (manager, store, _temp) = create_manager(&transport).await;
    let p1 = ConcreteResource::new(central(), "/a/p1.bin");
    let p2 = ConcreteResource::new(central(), "/b/p2.bin");

    assert_ok!(manager.store_bytes(&p1, b"shared bytes").await);
    manager
        .get_cache_reference(&p1)
        .copy_to(&manager.get_cache_reference(&p2))
        .await
        .unwrap();

    let id1 = store.entry(&p1).unwrap().unwrap().content_id.unwrap();
    let id2 = store.entry(&p2).unwrap().unwrap().content_id.unwrap();
    assert_eq!(id1, id2);

    let queued = |id: &ContentId| {
        store
            .db()
            .pending_reclaims()
            .unwrap()
            .iter()
            .any(|reclaim| reclaim.content_id == *id)
    };

    // p1's checksum sidecar goes with it, its blob stays referenced by p2
    assert!(manager.delete(&p1).await.unwrap());
    let remaining = manager.get_cache_reference(&p2).read_to_vec().await.unwrap();
    assert_eq!(remaining, b"shared bytes");
    assert!(!queued(&id1));

    assert!(manager.delete(&ConcreteResource::new(central(), "/b")).await.unwrap());
    assert!(queued(&id1));

    let early = store.gc_expired().await.unwrap();
    assert_eq!(early.reclaimed, 0);
    assert!(store.blobs().exists(&id1.storage_pointer()).await);

    let pending = store.db().pending_reclaims().unwrap().len();
    let late = store.gc(Utc::now() + chrono::Duration::hours(2)).await.unwrap();
    assert_eq!(late.reclaimed, pending);
    assert!(!store.blobs().exists(&id1.storage_pointer()).await);
    assert!(store.db().pending_reclaims().unwrap().is_empty());
}

/// Test fallback resolution over the path-mapped store
///
/// Verifies that each location keeps its own namespace in the path
/// database, so the same path cached for two locations does not collide.
#[tokio::test]
async fn test_locations_have_separate_namespaces() {
    let transport = MemoryTransport::new();
    let (manager, store, _temp) = create_manager(&transport).await;
    let mirror = Arc::new(Location::new("mirror", "mem://mirror"));
    let locations = vec![central(), mirror.clone()];
    let path = "/lib/x.jar";

    transport.put(&ConcreteResource::new(mirror.clone(), path), b"from mirror".to_vec());
    manager
        .store_bytes(&ConcreteResource::new(central(), "/lib/other.jar"), b"other")
        .await
        .unwrap();

    let transfer = manager
        .retrieve_first(&VirtualResource::from_locations(&locations, path))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transfer.location().name(), "mirror");
    assert!(store.entry(&ConcreteResource::new(central(), path)).unwrap().is_none());
    assert!(store.entry(&ConcreteResource::new(mirror, path)).unwrap().is_some());
}
