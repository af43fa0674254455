//! Integration tests for the transfer manager
//!
//! These tests drive the manager end to end over a file cache and the
//! in-memory transport: joins, fallback order, batch isolation, listing
//! merges and cache expiry.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use depot_transfer::app::cache::{FileCache, FileCacheConfig};
use depot_transfer::app::manager::TransferManager;
use depot_transfer::app::nfc::{ExpiringNotFoundCache, NotFoundCache};
use depot_transfer::app::resource::{ConcreteResource, Location, Resource, VirtualResource};
use depot_transfer::app::transfer::{ChannelEventDispatcher, TransferEvent, TransferRegistry};
use depot_transfer::app::transport::{FailureMode, MemoryTransport, TransportRegistry};
use depot_transfer::app::worker::ConfigPresets;
use depot_transfer::errors::TransferError;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    _temp: TempDir,
    cache: FileCache,
    manager: TransferManager,
    transport: MemoryTransport,
    events: UnboundedReceiver<TransferEvent>,
}

async fn create_harness(transport: MemoryTransport) -> Harness {
    let temp = TempDir::new().unwrap();
    let cache = FileCache::new(FileCacheConfig::with_cache_root(temp.path().to_path_buf()))
        .await
        .unwrap();
    let (dispatcher, events) = ChannelEventDispatcher::new();
    let manager = TransferManager::builder(
        TransferRegistry::new(Arc::new(cache.clone())),
        TransportRegistry::new().with_transport(Arc::new(transport.clone())),
    )
    .pool_config(ConfigPresets::testing())
    .not_found_cache(Arc::new(ExpiringNotFoundCache::new(Duration::from_secs(60))))
    .events(Arc::new(dispatcher))
    .build()
    .unwrap();

    Harness {
        _temp: temp,
        cache,
        manager,
        transport,
        events,
    }
}

fn location(name: &str) -> Arc<Location> {
    Arc::new(Location::new(name, format!("mem://{}", name)).with_publishing(true))
}

fn drain(events: &mut UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Test in-flight join across concurrent retrievals
///
/// Verifies that N concurrent retrievals of one uncached resource run a
/// single download job and all observe the same bytes.
#[tokio::test]
async fn test_concurrent_retrieve_joins_one_download() {
    let harness =
        create_harness(MemoryTransport::new().with_delay(Duration::from_millis(100))).await;
    let resource = ConcreteResource::new(location("central"), "/org/foo/1.0/foo-1.0.jar");
    harness.transport.put(&resource, b"jar content".to_vec());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = harness.manager.clone();
        let resource = resource.clone();
        tasks.push(tokio::spawn(async move {
            manager.retrieve(&resource, false).await
        }));
    }

    for task in tasks {
        let transfer = task.await.unwrap().unwrap().expect("content should be found");
        assert_eq!(transfer.read_to_vec().await.unwrap(), b"jar content");
    }
    assert_eq!(harness.transport.calls("download", &resource), 1);

    // a later retrieval is a cache hit
    harness.manager.retrieve(&resource, false).await.unwrap();
    assert_eq!(harness.transport.calls("download", &resource), 1);
}

/// Test virtual resource fallback order
///
/// Verifies that with candidates [A, B, C] where only B has the content,
/// the transfer resolves against B and C is never contacted.
#[tokio::test]
async fn test_retrieve_first_stops_at_first_hit() {
    let mut harness = create_harness(MemoryTransport::new()).await;
    let locations = vec![location("a"), location("b"), location("c")];
    let path = "/org/bar/2.0/bar-2.0.pom";
    let virtual_resource = VirtualResource::from_locations(&locations, path);
    let [a, b, c] = [0, 1, 2].map(|i| ConcreteResource::new(locations[i].clone(), path));
    harness.transport.put(&b, b"<project/>".to_vec());
    harness.transport.put(&c, b"<other/>".to_vec());

    let transfer = harness
        .manager
        .retrieve_first(&virtual_resource)
        .await
        .unwrap()
        .expect("b should serve the content");

    assert_eq!(transfer.location().name(), "b");
    assert_eq!(transfer.read_to_vec().await.unwrap(), b"<project/>");
    assert_eq!(harness.transport.calls("download", &a), 1);
    assert_eq!(harness.transport.calls("download", &b), 1);
    assert_eq!(harness.transport.calls("download", &c), 0);
    assert!(drain(&mut harness.events).is_empty());
}

/// Test error surfacing of fallback retrieval
///
/// Verifies that a miss after some candidates failed is not an error, while
/// every candidate failing surfaces the last error.
#[tokio::test]
async fn test_retrieve_first_error_semantics() {
    let mut harness = create_harness(MemoryTransport::new()).await;
    let locations = vec![location("a"), location("b")];
    let path = "/missing.jar";
    let a = ConcreteResource::new(locations[0].clone(), path);
    let b = ConcreteResource::new(locations[1].clone(), path);

    harness.transport.fail(&a, FailureMode::Hard);
    let result = harness
        .manager
        .retrieve_first(&VirtualResource::from_locations(&locations, path))
        .await;
    assert!(matches!(result, Ok(None)));

    harness.transport.fail(&b, FailureMode::BadGateway);
    let other_path = VirtualResource::new(vec![a.clone(), b.clone()]);
    harness.manager.not_found_cache().clear_all();
    let result = harness.manager.retrieve_first(&other_path).await;
    assert!(
        matches!(result, Err(TransferError::BadGateway { status: 502, .. })),
        "expected the last failure, got {:?}",
        result
    );

    let events = drain(&mut harness.events);
    assert!(events
        .iter()
        .any(|event| matches!(event, TransferEvent::NotFound { .. })));
    assert!(events
        .iter()
        .any(|event| matches!(event, TransferEvent::AccessFailed { .. })));
}

/// Test error kinds reach the caller
///
/// Verifies that a failed download surfaces the transport's own error kind,
/// so a timeout stays distinguishable from an interruption or an outage.
#[tokio::test]
async fn test_retrieve_keeps_error_kinds() {
    let harness = create_harness(MemoryTransport::new()).await;
    let central = location("central");
    let failing = |path: &str, mode: FailureMode| {
        let resource = ConcreteResource::new(central.clone(), path);
        harness.transport.fail(&resource, mode);
        resource
    };

    let timeout = failing("/timeout.jar", FailureMode::Timeout);
    let interrupted = failing("/interrupted.jar", FailureMode::Interrupted);
    let outage = failing("/outage.jar", FailureMode::Location);
    let gateway = failing("/gateway.jar", FailureMode::BadGateway);
    let hard = failing("/hard.jar", FailureMode::Hard);

    let result = harness.manager.retrieve(&timeout, false).await;
    assert!(matches!(result, Err(TransferError::Timeout { .. })), "{:?}", result);
    let result = harness.manager.retrieve(&interrupted, false).await;
    assert!(matches!(result, Err(TransferError::Interrupted { .. })), "{:?}", result);
    let result = harness.manager.retrieve(&outage, false).await;
    assert!(matches!(result, Err(TransferError::Location { .. })), "{:?}", result);
    let result = harness.manager.retrieve(&gateway, false).await;
    assert!(
        matches!(result, Err(TransferError::BadGateway { status: 502, .. })),
        "{:?}",
        result
    );
    let result = harness.manager.retrieve(&hard, false).await;
    assert!(matches!(result, Err(TransferError::Transfer { .. })), "{:?}", result);
}

/// Test negative caching of misses
///
/// Verifies that a confirmed miss is not asked of the remote again until
/// it is cleared by storing content.
#[tokio::test]
async fn test_miss_is_remembered() {
    let harness = create_harness(MemoryTransport::new()).await;
    let resource = ConcreteResource::new(location("central"), "/nope.pom");

    assert!(harness.manager.retrieve(&resource, false).await.unwrap().is_none());
    assert!(harness.manager.retrieve(&resource, false).await.unwrap().is_none());
    assert_eq!(harness.transport.calls("download", &resource), 1);
    assert!(harness.manager.not_found_cache().is_missing(&resource));

    harness.manager.store_bytes(&resource, b"local").await.unwrap();
    assert!(!harness.manager.not_found_cache().is_missing(&resource));
    let transfer = harness.manager.retrieve(&resource, false).await.unwrap().unwrap();
    assert_eq!(transfer.read_to_vec().await.unwrap(), b"local");
}

/// Test batch failure isolation
///
/// Verifies that a location error for one resource neither aborts the batch
/// nor is reported as a hard error, while other resources resolve and a
/// hard failure lands in the error map.
#[tokio::test]
async fn test_batch_isolates_failures() {
    let harness = create_harness(MemoryTransport::new()).await;
    let central = location("central");
    let broken = location("broken");

    let good: Vec<ConcreteResource> = (0..5)
        .map(|i| ConcreteResource::new(central.clone(), &format!("/lib/{}.jar", i)))
        .collect();
    for resource in &good {
        harness.transport.put(resource, resource.path().as_bytes().to_vec());
    }
    let unreachable = ConcreteResource::new(broken.clone(), "/lib/x.jar");
    harness.transport.fail(&unreachable, FailureMode::Location);
    let hard = ConcreteResource::new(central.clone(), "/lib/hard.jar");
    harness.transport.fail(&hard, FailureMode::Hard);
    let absent = ConcreteResource::new(central.clone(), "/lib/absent.jar");

    let mut requested: Vec<Resource> = good.iter().cloned().map(Resource::from).collect();
    requested.push(unreachable.clone().into());
    requested.push(hard.clone().into());
    requested.push(absent.clone().into());
    requested.push(good[0].clone().into());

    let batch = harness.manager.batch_retrieve(requested).await;

    assert_eq!(batch.resources().len(), 8);
    assert_eq!(batch.transfers().len(), 5);
    for resource in &good {
        let transfer = batch.transfer(&resource.clone().into()).unwrap();
        assert_eq!(
            transfer.read_to_vec().await.unwrap(),
            resource.path().as_bytes()
        );
    }
    assert_eq!(batch.errors().len(), 1);
    assert!(batch.error(&hard.into()).is_some());
    assert!(batch.error(&unreachable.clone().into()).is_none());
    assert_eq!(batch.missing().len(), 2);
}

/// Test batch fallback and retry budget
///
/// Verifies that a virtual resource in a batch falls through a broken
/// location, and that a transient timeout is retried on the same candidate.
#[tokio::test]
async fn test_batch_falls_back_and_retries() {
    let harness = create_harness(MemoryTransport::new()).await;
    let locations = vec![location("down"), location("up")];
    let path = "/group/artifact.pom";
    let down = ConcreteResource::new(locations[0].clone(), path);
    let up = ConcreteResource::new(locations[1].clone(), path);
    harness.transport.fail(&down, FailureMode::Location);
    harness.transport.put(&up, b"pom".to_vec());

    let flaky = ConcreteResource::new(locations[1].clone(), "/flaky.jar");
    harness.transport.put(&flaky, b"eventually".to_vec());
    harness.transport.fail_times(&flaky, FailureMode::Timeout, 1);

    let virtual_resource: Resource = VirtualResource::from_locations(&locations, path).into();
    let batch = harness
        .manager
        .batch_retrieve(vec![virtual_resource.clone(), flaky.clone().into()])
        .await;

    let resolved = batch.transfer(&virtual_resource).unwrap();
    assert_eq!(resolved.location().name(), "up");
    let retried = batch.transfer(&flaky.clone().into()).unwrap();
    assert_eq!(retried.read_to_vec().await.unwrap(), b"eventually");
    assert_eq!(harness.transport.calls("download", &flaky), 2);
    assert!(batch.errors().is_empty());
}

/// Test listing union with the cached sidecar
///
/// Verifies that a sidecar listing {X, Y} merged with a remote listing
/// {Y, Z} yields {X, Y, Z} with directories marked.
#[tokio::test]
async fn test_list_merges_sidecar_and_remote() {
    let harness = create_harness(MemoryTransport::new()).await;
    let central = location("central");
    let dir = ConcreteResource::new(central.clone(), "/org/lib");

    harness
        .manager
        .get_cache_reference(&dir.child(".listing.txt"))
        .write_bytes(b"x.jar\ny.jar\n")
        .await
        .unwrap();
    harness
        .transport
        .put(&dir.child("y.jar"), b"y".to_vec());
    harness
        .transport
        .put(&dir.child("z.jar"), b"z".to_vec());
    harness
        .transport
        .put(&dir.child("sub").child("nested.pom"), b"n".to_vec());

    let names = harness.manager.list(&dir).await.unwrap();
    assert_eq!(names, vec!["sub/", "x.jar", "y.jar", "z.jar"]);

    // the fresh remote listing replaced the sidecar
    let sidecar = harness
        .manager
        .get_cache_reference(&dir.child(".listing.txt"))
        .read_to_vec()
        .await
        .unwrap();
    assert_eq!(String::from_utf8(sidecar).unwrap(), "sub/\ny.jar\nz.jar\n");
}

/// Test listing degrades when the remote fails
#[tokio::test]
async fn test_list_survives_remote_failure() {
    let harness = create_harness(MemoryTransport::new()).await;
    let dir = ConcreteResource::new(location("central"), "/cached");
    harness
        .manager
        .store_bytes(&dir.child("local.jar"), b"l")
        .await
        .unwrap();
    harness.transport.fail(&dir, FailureMode::BadGateway);

    assert_eq!(harness.manager.list(&dir).await.unwrap(), vec!["local.jar"]);
}

/// Test timeout eviction
///
/// Verifies that a cached file older than its location's timeout is not
/// served and that a fresh download replaces it.
#[tokio::test]
async fn test_stale_cache_entry_is_refetched() {
    let harness = create_harness(MemoryTransport::new()).await;
    let short_lived = Arc::new(Location::new("snapshots", "mem://snapshots").with_cache_timeout(60));
    let resource = ConcreteResource::new(short_lived, "/app/1.0-SNAPSHOT/app.jar");
    harness.transport.put(&resource, b"build 1".to_vec());

    let first = harness.manager.retrieve(&resource, false).await.unwrap().unwrap();
    assert_eq!(first.read_to_vec().await.unwrap(), b"build 1");
    drop(first);

    let path = harness.cache.physical_path(&resource);
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
        .unwrap();
    drop(file);

    harness.transport.put(&resource, b"build 2".to_vec());
    let second = harness.manager.retrieve(&resource, false).await.unwrap().unwrap();
    assert_eq!(second.read_to_vec().await.unwrap(), b"build 2");
    assert_eq!(harness.transport.calls("download", &resource), 2);
}

/// Test permission checks on store and publish
#[tokio::test]
async fn test_store_and_publish_permissions() {
    let mut harness = create_harness(MemoryTransport::new()).await;
    let read_only = Arc::new(
        Location::new("ro", "mem://ro")
            .with_storing(false)
            .with_publishing(false),
    );
    let denied = ConcreteResource::new(read_only, "/a.jar");
    assert!(matches!(
        harness.manager.store_bytes(&denied, b"a").await,
        Err(TransferError::NotAllowed { .. })
    ));
    let mut reader = depot_transfer::app::transfer::BytesReader::new(b"a".to_vec());
    assert!(matches!(
        harness.manager.publish(&denied, &mut reader).await,
        Err(TransferError::NotAllowed { .. })
    ));

    let target = ConcreteResource::new(location("central"), "/released/a.jar");
    let mut reader = depot_transfer::app::transfer::BytesReader::new(b"release".to_vec());
    assert!(harness.manager.publish(&target, &mut reader).await.unwrap());
    assert_eq!(harness.transport.get(&target).unwrap(), b"release");
    assert!(harness.manager.get_cache_reference(&target).exists().await.unwrap());

    let events = drain(&mut harness.events);
    assert!(events.contains(&TransferEvent::Published {
        resource: target.clone()
    }));
}

/// Test recursive delete
///
/// Verifies that deleting a directory removes every cached descendant and
/// fires one event per removed entry.
#[tokio::test]
async fn test_delete_is_recursive() {
    let mut harness = create_harness(MemoryTransport::new()).await;
    let central = location("central");
    let root = ConcreteResource::new(central.clone(), "/tree");
    for path in ["/tree/a.jar", "/tree/sub/b.jar", "/tree/sub/deeper/c.pom"] {
        harness
            .manager
            .store_bytes(&ConcreteResource::new(central.clone(), path), b"x")
            .await
            .unwrap();
    }
    drain(&mut harness.events);

    assert!(harness.manager.delete(&root).await.unwrap());
    assert!(!harness.manager.get_cache_reference(&root).exists().await.unwrap());
    assert!(!harness.manager.delete(&root).await.unwrap());

    let deleted = drain(&mut harness.events)
        .into_iter()
        .filter(|event| matches!(event, TransferEvent::Deleted { .. }))
        .count();
    assert_eq!(deleted, 6);
}

/// Test existence checks across candidates
#[tokio::test]
async fn test_exists_and_find_existing() {
    let harness = create_harness(MemoryTransport::new()).await;
    let locations = vec![location("a"), location("b"), location("c")];
    let path = "/org/x.pom";
    harness
        .transport
        .put(&ConcreteResource::new(locations[1].clone(), path), b"b".to_vec());
    harness
        .manager
        .store_bytes(&ConcreteResource::new(locations[2].clone(), path), b"c")
        .await
        .unwrap();

    let candidates = VirtualResource::from_locations(&locations, path);
    assert!(harness.manager.exists(&candidates.clone().into()).await.unwrap());
    let first = harness.manager.find_first_existing(&candidates).await.unwrap().unwrap();
    assert_eq!(first.location().name(), "b");
    let all = harness.manager.find_all_existing(&candidates).await.unwrap();
    assert_eq!(all.len(), 2);

    // existence checks never download
    assert_eq!(harness.transport.total_calls("download"), 0);
}
