//! Logical records of the path-mapped store
//!
//! A [`PathMap`] is one directory entry: a [`PathKey`] naming it, plus the
//! content it points at. Directories carry no content id. Content ids are
//! stored as 16-byte MD5 digests and rendered as lowercase hex.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::app::resource::normalize_path;
use crate::errors::CacheError;

static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Key of a physical blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId([u8; 16]);

impl ContentId {
    /// Fresh content id for a write of `path` on `file_system`
    ///
    /// Derived from the path identity and the write instant, never from the
    /// bytes, so every write gets its own physical slot.
    pub fn generate(file_system: &str, path: &str) -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut context = md5::Context::new();
        context.consume(file_system.as_bytes());
        context.consume([0u8]);
        context.consume(path.as_bytes());
        context.consume([0u8]);
        context.consume(nanos.to_be_bytes());
        context.consume(sequence.to_be_bytes());
        ContentId(context.compute().0)
    }

    /// Parse a 32-character hex string (case insensitive)
    pub fn from_hex(hex: &str) -> Result<Self, CacheError> {
        let invalid = || CacheError::InvalidState {
            reason: format!("invalid content id: {}", hex),
        };
        if hex.len() != 32 || !hex.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(ContentId(bytes))
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Relative blob path, sharded by the first two bytes: `ab/cd/abcd...`
    pub fn storage_pointer(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}/{}", &hex[0..2], &hex[2..4], hex)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        ContentId::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

/// Logical directory entry: (file system, parent path, file name)
///
/// The root of a file system has an empty parent path and an empty name and
/// always exists implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathKey {
    pub file_system: String,
    pub parent_path: String,
    pub filename: String,
}

impl PathKey {
    /// Key for `path` on `file_system`; the path is normalized first
    pub fn new(file_system: &str, path: &str) -> Self {
        let path = normalize_path(path);
        if path == "/" {
            return Self {
                file_system: file_system.to_string(),
                parent_path: String::new(),
                filename: String::new(),
            };
        }

        let (parent, name) = match path.rfind('/') {
            Some(0) | None => ("/", &path[1..]),
            Some(idx) => (&path[..idx], &path[idx + 1..]),
        };
        Self {
            file_system: file_system.to_string(),
            parent_path: parent.to_string(),
            filename: name.to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.filename.is_empty()
    }

    /// Full normalized path of the entry
    pub fn path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else if self.parent_path == "/" {
            format!("/{}", self.filename)
        } else {
            format!("{}/{}", self.parent_path, self.filename)
        }
    }

    /// Key of the containing directory, `None` for the root
    pub fn parent(&self) -> Option<PathKey> {
        if self.is_root() {
            None
        } else {
            Some(PathKey::new(&self.file_system, &self.parent_path))
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_system, self.path())
    }
}

/// A path entry and the content it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMap {
    pub key: PathKey,
    /// `None` for directories
    pub content_id: Option<ContentId>,
    pub size: u64,
    pub creation: DateTime<Utc>,
    /// Blob path relative to the blob directory, `None` for directories
    pub storage_pointer: Option<String>,
}

impl PathMap {
    /// Directory entry created now
    pub fn directory(key: PathKey) -> Self {
        Self {
            key,
            content_id: None,
            size: 0,
            creation: Utc::now(),
            storage_pointer: None,
        }
    }

    /// File entry for a finished blob
    pub fn file(key: PathKey, content_id: ContentId, size: u64) -> Self {
        Self {
            key,
            storage_pointer: Some(content_id.storage_pointer()),
            content_id: Some(content_id),
            size,
            creation: Utc::now(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.content_id.is_none()
    }
}

/// One version of a content id's reference set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseMap {
    pub content_id: ContentId,
    pub version: u32,
    pub paths: Vec<PathKey>,
}

/// Blob queued for physical deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclaim {
    pub content_id: ContentId,
    pub queued_at: DateTime<Utc>,
    pub storage_pointer: String,
}
