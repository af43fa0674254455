//! Integration tests for the HTTP transport
//!
//! A local mock server stands in for a remote repository; the manager drives
//! the transport exactly as it would in production.

use std::sync::Arc;

use depot_transfer::app::cache::{FileCache, FileCacheConfig};
use depot_transfer::app::manager::TransferManager;
use depot_transfer::app::resource::{ConcreteResource, Location};
use depot_transfer::app::transfer::{BytesReader, TransferRegistry};
use depot_transfer::app::transport::{HttpTransport, HttpTransportConfig, TransportRegistry};
use depot_transfer::app::worker::ConfigPresets;
use depot_transfer::errors::TransferError;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn create_manager() -> (TransferManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let cache = FileCache::new(FileCacheConfig::with_cache_root(temp_dir.path().to_path_buf()))
        .await
        .unwrap();
    let transport = HttpTransport::new(HttpTransportConfig::default().with_rate_limit(100)).unwrap();
    let manager = TransferManager::builder(
        TransferRegistry::new(Arc::new(cache)),
        TransportRegistry::new().with_transport(Arc::new(transport)),
    )
    .pool_config(ConfigPresets::testing())
    .build()
    .unwrap();
    (manager, temp_dir)
}

fn remote(server: &MockServer) -> Arc<Location> {
    Arc::new(Location::new("remote", server.uri()).with_publishing(true))
}

/// Test successful download
///
/// Verifies that a 200 response body lands in the cache and that a second
/// retrieval is served locally.
#[tokio::test]
async fn test_download_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/org/foo/1.0/foo-1.0.pom"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<project/>".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, _temp) = create_manager().await;
    let resource = ConcreteResource::new(remote(&server), "/org/foo/1.0/foo-1.0.pom");

    let transfer = manager.retrieve(&resource, false).await.unwrap().unwrap();
    assert_eq!(transfer.read_to_vec().await.unwrap(), b"<project/>");

    let again = manager.retrieve(&resource, false).await.unwrap().unwrap();
    assert_eq!(again.read_to_vec().await.unwrap(), b"<project/>");
}

/// Test missing remote content
///
/// Verifies that a 404 is reported as absence rather than an error and
/// leaves nothing in the cache.
#[tokio::test]
async fn test_not_found_is_absence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (manager, _temp) = create_manager().await;
    let resource = ConcreteResource::new(remote(&server), "/org/missing/1.0/missing-1.0.jar");

    assert!(manager.retrieve(&resource, false).await.unwrap().is_none());
    assert!(!manager.get_cache_reference(&resource).exists().await.unwrap());
}

/// Test server errors
///
/// Verifies that a 5xx response surfaces as a bad gateway failure carrying
/// the status code.
#[tokio::test]
async fn test_server_error_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (manager, _temp) = create_manager().await;
    let resource = ConcreteResource::new(remote(&server), "/org/foo/1.0/foo-1.0.jar");

    let error = manager.retrieve(&resource, false).await.unwrap_err();
    assert!(
        matches!(error, TransferError::BadGateway { status: 503, .. }),
        "unexpected error: {:?}",
        error
    );
    assert!(!error.is_location_error());
}

/// Test unreachable location
///
/// Verifies that a refused connection is classified as a location failure.
#[tokio::test]
async fn test_connection_refused_is_location_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let location = Arc::new(Location::new("down", format!("http://127.0.0.1:{}", port)));
    let (manager, _temp) = create_manager().await;
    let resource = ConcreteResource::new(location, "/a/a.jar");

    let error = manager.retrieve(&resource, false).await.unwrap_err();
    assert!(matches!(error, TransferError::Location { .. }), "unexpected error: {:?}", error);
    assert!(manager.retrieve(&resource, true).await.unwrap().is_none());
}

/// Test directory index parsing
///
/// Verifies that only direct children are listed, with directories marked
/// by a trailing slash and parent or sort links ignored.
#[tokio::test]
async fn test_listing_parses_index_page() {
    let server = MockServer::start().await;
    let html = r#"<html><body>
        <a href="../">../</a>
        <a href="?C=N;O=D">Name</a>
        <a href="1.0/">1.0/</a>
        <a href="maven-metadata.xml">maven-metadata.xml</a>
        <a href="https://elsewhere.example.org/x.jar">x.jar</a>
        <a href="1.0/foo-1.0.jar">nested</a>
    </body></html>"#;
    Mock::given(method("GET"))
        .and(path("/org/foo/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let (manager, _temp) = create_manager().await;
    let listing = manager
        .list(&ConcreteResource::new(remote(&server), "/org/foo"))
        .await
        .unwrap();
    assert_eq!(listing, vec!["1.0/", "maven-metadata.xml"]);
}

/// Test remote existence checks
///
/// Verifies that HEAD requests answer existence without downloading.
#[tokio::test]
async fn test_existence_uses_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/present.jar"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (manager, _temp) = create_manager().await;
    let location = remote(&server);
    let present = ConcreteResource::new(location.clone(), "/present.jar");
    let absent = ConcreteResource::new(location, "/absent.jar");

    assert!(manager.exists_concrete(&present, false).await.unwrap());
    assert!(!manager.exists_concrete(&absent, false).await.unwrap());
    assert!(!manager.get_cache_reference(&present).exists().await.unwrap());
}

/// Test publishing with PUT
///
/// Verifies that published content is uploaded and kept in the cache.
#[tokio::test]
async fn test_publish_uploads_content() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/releases/app-2.0.jar"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, _temp) = create_manager().await;
    let resource = ConcreteResource::new(remote(&server), "/releases/app-2.0.jar");
    let mut reader = BytesReader::new(b"release bytes".to_vec());

    assert!(manager.publish(&resource, &mut reader).await.unwrap());
    let cached = manager.get_cache_reference(&resource).read_to_vec().await.unwrap();
    assert_eq!(cached, b"release bytes");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].body, b"release bytes");
}
