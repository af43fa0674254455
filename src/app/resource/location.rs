//! Remote endpoint descriptors
//!
//! A `Location` names a remote origin (or a local directory) and carries the
//! permissions and timeouts that every resource resolved against it inherits.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{ConfigError, ConfigResult};

/// Endpoint descriptor shared by every resource resolved against it
///
/// Two locations are equal when their name and URI are equal; permissions,
/// timeouts and attributes do not take part in identity so that cache keys
/// stay stable when a location is reconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Unique location name, also used as the path-mapped filesystem id
    pub name: String,
    /// Base URI of the endpoint
    pub uri: String,
    /// Content may be fetched from this location
    #[serde(default = "default_true")]
    pub allows_downloading: bool,
    /// Content may be written into the local cache for this location
    #[serde(default = "default_true")]
    pub allows_storing: bool,
    /// Content may be uploaded to the remote endpoint
    #[serde(default)]
    pub allows_publishing: bool,
    /// Snapshot artifacts are served
    #[serde(default)]
    pub allows_snapshots: bool,
    /// Release artifacts are served
    #[serde(default = "default_true")]
    pub allows_releases: bool,
    /// Age after which cached content is considered stale (0 = provider default)
    #[serde(default, alias = "cache_timeout_secs")]
    pub cache_timeout_seconds: u64,
    /// Budget for network operations against this location (0 = engine default)
    #[serde(default, alias = "connection_timeout_secs")]
    pub connection_timeout_seconds: u64,
    /// Arbitrary transport-specific attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Location {
    /// Create a location with default permissions (download + store, releases only)
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            allows_downloading: true,
            allows_storing: true,
            allows_publishing: false,
            allows_snapshots: false,
            allows_releases: true,
            cache_timeout_seconds: 0,
            connection_timeout_seconds: 0,
            attributes: BTreeMap::new(),
        }
    }

    /// Location name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Parsed base URI
    pub fn parsed_uri(&self) -> ConfigResult<Url> {
        Url::parse(&self.uri).map_err(|e| ConfigError::InvalidValue {
            field: format!("locations.{}.uri", self.name),
            value: self.uri.clone(),
            reason: e.to_string(),
        })
    }

    /// URI scheme (`http`, `https`, `file`, ...)
    pub fn scheme(&self) -> Option<&str> {
        self.uri.split_once("://").map(|(scheme, _)| scheme)
    }

    /// Allow or forbid downloading
    pub fn with_downloading(mut self, allowed: bool) -> Self {
        self.allows_downloading = allowed;
        self
    }

    /// Allow or forbid storing
    pub fn with_storing(mut self, allowed: bool) -> Self {
        self.allows_storing = allowed;
        self
    }

    /// Allow or forbid publishing
    pub fn with_publishing(mut self, allowed: bool) -> Self {
        self.allows_publishing = allowed;
        self
    }

    /// Allow or forbid snapshots
    pub fn with_snapshots(mut self, allowed: bool) -> Self {
        self.allows_snapshots = allowed;
        self
    }

    /// Allow or forbid releases
    pub fn with_releases(mut self, allowed: bool) -> Self {
        self.allows_releases = allowed;
        self
    }

    /// Set the cache timeout in seconds
    pub fn with_cache_timeout(mut self, seconds: u64) -> Self {
        self.cache_timeout_seconds = seconds;
        self
    }

    /// Set the connection timeout in seconds
    pub fn with_connection_timeout(mut self, seconds: u64) -> Self {
        self.connection_timeout_seconds = seconds;
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Configured cache timeout, falling back to `default` and never below `minimum`
    pub fn cache_timeout_or(&self, default: Duration, minimum: Duration) -> Duration {
        let configured = if self.cache_timeout_seconds == 0 {
            default
        } else {
            Duration::from_secs(self.cache_timeout_seconds)
        };
        configured.max(minimum)
    }

    /// Configured connection timeout, falling back to `default`
    pub fn connection_timeout_or(&self, default: Duration) -> Duration {
        if self.connection_timeout_seconds == 0 {
            default
        } else {
            Duration::from_secs(self.connection_timeout_seconds)
        }
    }

    /// Validate name and URI
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "locations.name".to_string(),
            });
        }
        self.parsed_uri()?;
        Ok(())
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.uri == other.uri
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.uri.hash(state);
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uri)
    }
}
