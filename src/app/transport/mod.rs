//! Transport SPI and registry
//!
//! A transport knows how to talk to one kind of remote endpoint. It never
//! performs work directly: each operation produces a [`TransportJob`] which
//! the handlers run on the shared worker pool. Jobs report ordinary failures
//! through their `Result`; "not found" is `Ok(None)`/`Ok(false)`, never an
//! error.
//!
//! # Module Organization
//!
//! - [`file`] - Local filesystem transport for `file://` locations
//! - [`http`] - HTTP(S) transport with rate limiting
//! - [`memory`] - In-memory transport for `mem://` locations
//! - [`config`] - HTTP transport configuration

pub mod config;
pub mod file;
pub mod http;
pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::app::resource::{ConcreteResource, Location};
use crate::app::transfer::Transfer;
use crate::errors::TransferResult;

pub use config::HttpTransportConfig;
pub use file::FileTransport;
pub use http::HttpTransport;
pub use memory::{FailureMode, MemoryTransport};

/// A unit of remote work, run at most once
#[async_trait]
pub trait TransportJob<T: Send>: Send {
    async fn call(self: Box<Self>) -> TransferResult<T>;
}

/// Remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingResult {
    pub resource: ConcreteResource,
    /// Child names; directories carry a trailing `/`
    pub entries: Vec<String>,
}

impl ListingResult {
    pub fn new(resource: ConcreteResource, entries: Vec<String>) -> Self {
        Self { resource, entries }
    }
}

/// Job factory for one family of remote endpoints
pub trait Transport: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Whether this transport can reach `location`
    fn handles(&self, location: &Location) -> bool;

    /// Fetch `url` into `target`; the job yields the transfer now holding the
    /// content, or `None` when the remote has nothing at `url`
    fn create_download_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        target: Transfer,
        timeout: Duration,
    ) -> Box<dyn TransportJob<Option<Transfer>>>;

    /// List the remote directory at `url`; `None` when it does not exist
    fn create_listing_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        timeout: Duration,
    ) -> Box<dyn TransportJob<Option<ListingResult>>>;

    /// Check whether anything exists at `url`
    fn create_existence_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        timeout: Duration,
    ) -> Box<dyn TransportJob<bool>>;

    /// Upload the content of `source` to `url`
    fn create_publish_job(
        &self,
        url: &str,
        resource: &ConcreteResource,
        source: Transfer,
        timeout: Duration,
    ) -> Box<dyn TransportJob<bool>>;
}

/// Ordered set of transports; the first that handles a location wins
#[derive(Debug, Clone, Default)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.register(transport);
        self
    }

    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        debug!("Registered transport: {}", transport.name());
        self.transports.push(transport);
    }

    /// Transport for `location`, if any handles it
    pub fn get(&self, location: &Location) -> Option<Arc<dyn Transport>> {
        self.transports
            .iter()
            .find(|transport| transport.handles(location))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}
