//! HTTP(S) transport with rate limiting
//!
//! Status mapping:
//!
//! - `404`/`410` → not found (`Ok(None)` / `Ok(false)`)
//! - `5xx` → [`TransferError::BadGateway`]
//! - connection failures → location-scoped error
//! - request timeouts → [`TransferError::Timeout`]
//!
//! Directory listings are parsed from the anchors of the index page.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::config::HttpTransportConfig;
use super::{ListingResult, Transport, TransportJob};
use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::Transfer;
use crate::constants::files::DIRECTORY_MARKER;
use crate::errors::{TransferError, TransferResult};

type DirectLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Transport for `http://` and `https://` locations
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Arc<HttpInner>,
}

#[derive(Debug)]
struct HttpInner {
    client: Client,
    rate_limiter: DirectLimiter,
}

impl HttpTransport {
    /// Creates a transport from configuration
    ///
    /// # Errors
    ///
    /// Returns `TransferError` if the configuration is invalid or the client
    /// cannot be built
    pub fn new(config: HttpTransportConfig) -> TransferResult<Self> {
        config
            .validate()
            .map_err(|reason| TransferError::transfer("http transport", reason))?;
        let client = config.build_http_client()?;
        let rate_limiter = Self::build_rate_limiter(config.rate_limit_rps)?;
        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                rate_limiter,
            }),
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> TransferResult<DirectLimiter> {
        let quota = Quota::per_second(NonZeroU32::new(rate_limit_rps).ok_or_else(|| {
            TransferError::transfer("http transport", "Rate limit must be non-zero")
        })?);
        Ok(RateLimiter::direct(quota))
    }
}

impl HttpInner {
    /// Send a request after waiting for the rate limiter
    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        resource: &ConcreteResource,
        timeout: Duration,
        body: Option<Vec<u8>>,
    ) -> TransferResult<Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| classify_error(e, url, resource, timeout))
    }
}

fn classify_error(
    error: reqwest::Error,
    url: &str,
    resource: &ConcreteResource,
    timeout: Duration,
) -> TransferError {
    if error.is_timeout() {
        TransferError::Timeout {
            url: url.to_string(),
            seconds: timeout.as_secs(),
        }
    } else if error.is_connect() {
        TransferError::location(resource.location().name(), error.to_string())
    } else {
        TransferError::Http(error)
    }
}

fn is_not_found(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::GONE
}

/// Turn an unsuccessful status into an error
fn check_status(response: &Response, url: &str, resource: &ConcreteResource) -> TransferResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() {
        Err(TransferError::BadGateway {
            url: url.to_string(),
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("server error").to_string(),
        })
    } else {
        Err(TransferError::transfer(
            resource,
            format!("unexpected HTTP status {} from {}", status, url),
        ))
    }
}

/// Extract direct child names from an index page
///
/// Only anchors resolving to a direct child of `base` are kept; directory
/// entries keep their trailing `/`.
pub fn parse_listing(base: &Url, html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut entries: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('?') || href.starts_with('#') {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let Some(rest) = resolved.as_str().strip_prefix(base.as_str()) else {
            continue;
        };
        let name = rest.trim_end_matches(DIRECTORY_MARKER);
        if name.is_empty() || name.contains('/') || name.contains('?') || name.contains('#') {
            continue;
        }
        let entry = if rest.ends_with(DIRECTORY_MARKER) {
            format!("{}{}", name, DIRECTORY_MARKER)
        } else {
            name.to_string()
        };
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    entries.sort();
    entries
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn handles(&self, location: &Location) -> bool {
        matches!(location.scheme(), Some("http") | Some("https"))
    }

    fn create_download_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        target: Transfer,
        timeout: Duration,
    ) -> Box<dyn TransportJob<Option<Transfer>>> {
        Box::new(HttpDownloadJob {
            inner: self.inner.clone(),
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
        Box::new(HttpListingJob {
            inner: self.inner.clone(),
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
        Box::new(HttpExistenceJob {
            inner: self.inner.clone(),
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
        Box::new(HttpPublishJob {
            inner: self.inner.clone(),
            url: url.to_string(),
            resource: resource.clone(),
            source,
            timeout,
        })
    }
}

struct HttpDownloadJob {
    inner: Arc<HttpInner>,
    url: String,
    resource: ConcreteResource,
    target: Transfer,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<Option<Transfer>> for HttpDownloadJob {
    async fn call(self: Box<Self>) -> TransferResult<Option<Transfer>> {
        let job = *self;
        let mut response = job
            .inner
            .send(reqwest::Method::GET, &job.url, &job.resource, job.timeout, None)
            .await?;
        if is_not_found(response.status()) {
            debug!("Remote has no {}", job.url);
            return Ok(None);
        }
        check_status(&response, &job.url, &job.resource)?;

        let mut writer = job.target.open_output().await?;
        loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| classify_error(e, &job.url, &job.resource, job.timeout))?;
            match chunk {
                Some(bytes) => writer.write_all(&bytes).await?,
                None => break,
            }
        }
        let bytes = writer.finish().await?;
        debug!("Downloaded {} bytes from {}", bytes, job.url);
        Ok(Some(job.target))
    }
}

struct HttpListingJob {
    inner: Arc<HttpInner>,
    url: String,
    resource: ConcreteResource,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<Option<ListingResult>> for HttpListingJob {
    async fn call(self: Box<Self>) -> TransferResult<Option<ListingResult>> {
        let url = if self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        };
        let base = Url::parse(&url)
            .map_err(|e| TransferError::location(self.resource.location().name(), e.to_string()))?;

        let response = self
            .inner
            .send(reqwest::Method::GET, &url, &self.resource, self.timeout, None)
            .await?;
        if is_not_found(response.status()) {
            return Ok(None);
        }
        check_status(&response, &url, &self.resource)?;

        let html = response
            .text()
            .await
            .map_err(|e| classify_error(e, &url, &self.resource, self.timeout))?;
        let entries = parse_listing(&base, &html);
        debug!("Listed {} entries at {}", entries.len(), url);
        Ok(Some(ListingResult::new(self.resource.clone(), entries)))
    }
}

struct HttpExistenceJob {
    inner: Arc<HttpInner>,
    url: String,
    resource: ConcreteResource,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<bool> for HttpExistenceJob {
    async fn call(self: Box<Self>) -> TransferResult<bool> {
        let response = self
            .inner
            .send(reqwest::Method::HEAD, &self.url, &self.resource, self.timeout, None)
            .await?;
        if is_not_found(response.status()) {
            return Ok(false);
        }
        check_status(&response, &self.url, &self.resource)?;
        Ok(true)
    }
}

struct HttpPublishJob {
    inner: Arc<HttpInner>,
    url: String,
    resource: ConcreteResource,
    source: Transfer,
    timeout: Duration,
}

#[async_trait]
impl TransportJob<bool> for HttpPublishJob {
    async fn call(self: Box<Self>) -> TransferResult<bool> {
        let body = self.source.read_to_vec().await?;
        let size = body.len();
        let response = self
            .inner
            .send(reqwest::Method::PUT, &self.url, &self.resource, self.timeout, Some(body))
            .await?;
        if let Err(e) = check_status(&response, &self.url, &self.resource) {
            warn!("Publishing {} failed: {}", self.url, e);
            return Err(e);
        }
        debug!("Published {} bytes to {}", size, self.url);
        Ok(true)
    }
}
