//! Concrete (location, path) resources

use std::fmt;
use std::sync::Arc;

use super::location::Location;

/// A single addressable item: one path on one location
///
/// Paths are normalized on construction so that `a//b/./c/` and `/a/b/c`
/// identify the same resource. The root directory is `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcreteResource {
    location: Arc<Location>,
    path: String,
}

impl ConcreteResource {
    /// Create a resource for `path` on `location`
    pub fn new(location: Arc<Location>, path: &str) -> Self {
        Self {
            location,
            path: normalize_path(path),
        }
    }

    /// Root directory of `location`
    pub fn root(location: Arc<Location>) -> Self {
        Self::new(location, "/")
    }

    /// Owning location
    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }

    /// Normalized path, always starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// True for the location's root directory
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Last path segment (empty for the root)
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Parent directory path (empty for the root)
    pub fn parent_path(&self) -> &str {
        if self.is_root() {
            return "";
        }
        match self.path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &self.path[..idx],
            None => "/",
        }
    }

    /// Parent directory resource, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            Some(Self::new(self.location.clone(), self.parent_path()))
        }
    }

    /// Child resource `name` below this one
    pub fn child(&self, name: &str) -> Self {
        Self::new(self.location.clone(), &format!("{}/{}", self.path, name))
    }

    /// Resource whose path is this path with `suffix` appended
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self::new(self.location.clone(), &format!("{}{}", self.path, suffix))
    }

    /// Same path on a different location
    pub fn relocate(&self, location: Arc<Location>) -> Self {
        Self {
            location,
            path: self.path.clone(),
        }
    }

    /// Remote URL: location URI joined with the path
    pub fn url(&self) -> String {
        let base = self.location.uri().trim_end_matches('/');
        if self.is_root() {
            format!("{}/", base)
        } else {
            format!("{}{}", base, self.path)
        }
    }

    /// Content may be fetched from the remote
    pub fn allows_downloading(&self) -> bool {
        self.location.allows_downloading
    }

    /// Content may be written into the cache
    pub fn allows_storing(&self) -> bool {
        self.location.allows_storing
    }

    /// Content may be uploaded to the remote
    pub fn allows_publishing(&self) -> bool {
        self.location.allows_publishing
    }

    /// Location serves snapshots
    pub fn allows_snapshots(&self) -> bool {
        self.location.allows_snapshots
    }

    /// Location serves releases
    pub fn allows_releases(&self) -> bool {
        self.location.allows_releases
    }
}

impl fmt::Display for ConcreteResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location.name(), self.path)
    }
}

/// Normalize a slash-separated path: leading `/`, no empty or `.` segments,
/// `..` resolved, no trailing `/` except for the root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}
