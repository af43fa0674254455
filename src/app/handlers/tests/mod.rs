//! Handler tests against the in-memory transport

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::app::cache::{FileCache, FileCacheConfig};
use crate::app::handlers::{DownloadHandler, ExistsHandler, ListingHandler, UploadHandler};
use crate::app::nfc::{ExpiringNotFoundCache, NotFoundCache};
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::TransferRegistry;
use crate::app::transport::{FailureMode, MemoryTransport, Transport};
use crate::app::worker::{ConfigPresets, WorkerPool};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Fixture {
    _temp: TempDir,
    registry: TransferRegistry,
    pool: WorkerPool,
    nfc: Arc<ExpiringNotFoundCache>,
    transport: MemoryTransport,
    location: Arc<Location>,
}

impl Fixture {
    async fn new(transport: MemoryTransport) -> Self {
        let temp = TempDir::new().unwrap();
        let cache = FileCache::new(FileCacheConfig::with_cache_root(temp.path().to_path_buf()))
            .await
            .unwrap();
        Self {
            _temp: temp,
            registry: TransferRegistry::new(Arc::new(cache)),
            pool: WorkerPool::new(ConfigPresets::testing()).unwrap(),
            nfc: Arc::new(ExpiringNotFoundCache::default()),
            transport,
            location: Arc::new(Location::new("remote", "mem://remote").with_publishing(true)),
        }
    }

    fn resource(&self, path: &str) -> ConcreteResource {
        ConcreteResource::new(self.location.clone(), path)
    }

    fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.transport.clone())
    }

    fn nfc(&self) -> Arc<dyn NotFoundCache> {
        self.nfc.clone()
    }
}

/// Test in-flight join for concurrent downloads
///
/// Verifies that concurrent downloads of the same URL run exactly one
/// transport job and all observe the same content.
#[tokio::test]
async fn test_concurrent_downloads_share_one_job() {
    let fixture = Fixture::new(MemoryTransport::new().with_delay(Duration::from_millis(100))).await;
    let resource = fixture.resource("/org/foo/foo.jar");
    fixture.transport.put(&resource, b"jar bytes".to_vec());

    let handler = Arc::new(DownloadHandler::new(fixture.pool.clone(), fixture.nfc()));
    let mut tasks = Vec::new();
    for _ in 0..5 {
        let handler = handler.clone();
        let resource = resource.clone();
        let target = fixture.registry.get_transfer(&resource);
        let transport = fixture.transport();
        tasks.push(tokio::spawn(async move {
            handler
                .download(&resource, target, TIMEOUT, transport, false)
                .await
        }));
    }

    for task in tasks {
        let transfer = task.await.unwrap().unwrap().unwrap();
        assert_eq!(transfer.read_to_vec().await.unwrap(), b"jar bytes");
    }
    assert_eq!(fixture.transport.calls("download", &resource), 1);
    assert_eq!(handler.pending(), 0);
}

/// Test that a cached target short-circuits the network
#[tokio::test]
async fn test_existing_target_skips_transport() {
    let fixture = Fixture::new(MemoryTransport::new()).await;
    let resource = fixture.resource("/cached.txt");
    let target = fixture.registry.get_transfer(&resource);
    target.write_bytes(b"local").await.unwrap();

    let handler = DownloadHandler::new(fixture.pool.clone(), fixture.nfc());
    let result = handler
        .download(&resource, target, TIMEOUT, fixture.transport(), false)
        .await
        .unwrap();
    assert!(result.is_some());
    assert_eq!(fixture.transport.total_calls("download"), 0);
}

/// Test negative caching of missing content
///
/// Verifies that a miss is recorded and the next attempt does not reach
/// the transport.
#[tokio::test]
async fn test_missing_resource_is_negatively_cached() {
    let fixture = Fixture::new(MemoryTransport::new()).await;
    let resource = fixture.resource("/absent.txt");
    let handler = DownloadHandler::new(fixture.pool.clone(), fixture.nfc());

    for _ in 0..2 {
        let target = fixture.registry.get_transfer(&resource);
        let result = handler
            .download(&resource, target, TIMEOUT, fixture.transport(), false)
            .await
            .unwrap();
        assert!(result.is_none());
    }
    assert!(fixture.nfc.is_missing(&resource));
    assert_eq!(fixture.transport.calls("download", &resource), 1);
}

/// Test the suppress-failures policy
#[tokio::test]
async fn test_failures_raised_or_suppressed() {
    let fixture = Fixture::new(MemoryTransport::new()).await;
    let handler = DownloadHandler::new(fixture.pool.clone(), fixture.nfc());

    let hard = fixture.resource("/broken.txt");
    fixture.transport.fail(&hard, FailureMode::Hard);
    let err = handler
        .download(
            &hard,
            fixture.registry.get_transfer(&hard),
            TIMEOUT,
            fixture.transport(),
            false,
        )
        .await
        .unwrap_err();
    assert!(!err.is_location_error());
    assert!(fixture.nfc.is_missing(&hard));

    let flaky = fixture.resource("/flaky.txt");
    fixture.transport.fail(&flaky, FailureMode::Timeout);
    let suppressed = handler
        .download(
            &flaky,
            fixture.registry.get_transfer(&flaky),
            TIMEOUT,
            fixture.transport(),
            true,
        )
        .await
        .unwrap();
    assert!(suppressed.is_none());
    assert!(!fixture.nfc.is_missing(&flaky));
}

/// Test that a wait timeout is reported while the job carries on
#[tokio::test]
async fn test_wait_timeout() {
    let fixture = Fixture::new(MemoryTransport::new().with_delay(Duration::from_millis(200))).await;
    let resource = fixture.resource("/slow.txt");
    fixture.transport.put(&resource, b"slow".to_vec());
    let handler = DownloadHandler::new(fixture.pool.clone(), fixture.nfc());

    let err = handler
        .download(
            &resource,
            fixture.registry.get_transfer(&resource),
            Duration::from_millis(20),
            fixture.transport(),
            false,
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let target = fixture.registry.get_transfer(&resource);
    assert!(target.exists().await.unwrap());
}

/// Test that a successful upload clears the not-found record
#[tokio::test]
async fn test_upload_clears_missing_record() {
    let fixture = Fixture::new(MemoryTransport::new()).await;
    let resource = fixture.resource("/new.txt");
    fixture.nfc.add_missing(&resource);

    let source = fixture.registry.get_transfer(&resource);
    source.write_bytes(b"fresh").await.unwrap();

    let handler = UploadHandler::new(fixture.pool.clone(), fixture.nfc());
    let ok = handler
        .upload(&resource, source, TIMEOUT, fixture.transport(), false)
        .await
        .unwrap();
    assert!(ok);
    assert!(!fixture.nfc.is_missing(&resource));
    assert_eq!(fixture.transport.get(&resource).unwrap(), b"fresh");
}

/// Test listing and existence handlers
#[tokio::test]
async fn test_listing_and_exists() {
    let fixture = Fixture::new(MemoryTransport::new()).await;
    fixture.transport.put(&fixture.resource("/dir/a.txt"), b"a".to_vec());
    fixture.transport.put(&fixture.resource("/dir/nested/b.txt"), b"b".to_vec());

    let listing = ListingHandler::new(fixture.pool.clone(), fixture.nfc());
    let dir = fixture.resource("/dir");
    let result = listing
        .list(&dir, TIMEOUT, fixture.transport(), false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.entries, vec!["a.txt", "nested/"]);

    let empty = fixture.resource("/void");
    assert!(listing
        .list(&empty, TIMEOUT, fixture.transport(), false)
        .await
        .unwrap()
        .is_none());
    assert!(fixture.nfc.is_missing(&empty));

    let exists = ExistsHandler::new(fixture.pool.clone(), fixture.nfc());
    assert!(exists
        .exists(&fixture.resource("/dir/a.txt"), TIMEOUT, fixture.transport(), false)
        .await
        .unwrap());
    assert!(!exists
        .exists(&fixture.resource("/dir/none"), TIMEOUT, fixture.transport(), false)
        .await
        .unwrap());
    assert!(!exists
        .exists(&empty, TIMEOUT, fixture.transport(), false)
        .await
        .unwrap());
    assert_eq!(fixture.transport.calls("exists", &empty), 0);
}
