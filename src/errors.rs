//! Error types for Depot Transfer
//!
//! This module defines the error taxonomy for every component of the engine.
//! Transfer errors distinguish failures that are scoped to a single candidate
//! location (and must never abort fallback or batch retrieval) from failures
//! that belong to the requested resource itself.

use std::path::PathBuf;

use thiserror::Error;

/// Transfer orchestration and transport errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Generic transfer failure with formatted context
    #[error("Transfer failed for {resource}: {message}")]
    Transfer { resource: String, message: String },

    /// A specific candidate location is unusable
    #[error("Location {location} is unavailable: {message}")]
    Location { location: String, message: String },

    /// Network operation or join wait exceeded its budget
    #[error("Timed out after {seconds} seconds waiting for {url}")]
    Timeout { url: String, seconds: u64 },

    /// Remote responded with a server-side failure
    #[error("Bad gateway for {url}: HTTP {status} {message}")]
    BadGateway {
        url: String,
        status: u16,
        message: String,
    },

    /// The job was cancelled or the worker pool shut down before it finished
    #[error("Transfer of {url} was interrupted")]
    Interrupted { url: String },

    /// Resource's location does not permit the requested operation
    #[error("Operation '{operation}' is not allowed for {resource}")]
    NotAllowed { resource: String, operation: String },

    /// Shared job failure whose underlying library error cannot be rebuilt
    #[error("Joined transfer of {key} failed: {message}")]
    Joined {
        key: String,
        message: String,
        location_scoped: bool,
        retryable: bool,
    },

    /// Storage-side failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// I/O error while streaming content
    #[error("Transfer I/O error")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),
}

impl TransferError {
    /// Create a generic transfer error for a resource
    pub fn transfer(resource: impl ToString, message: impl Into<String>) -> Self {
        Self::Transfer {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Create a location-scoped error
    pub fn location(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Location {
            location: location.into(),
            message: message.into(),
        }
    }

    /// True when the failure belongs to one candidate location rather than the resource
    pub fn is_location_error(&self) -> bool {
        match self {
            TransferError::Location { .. } => true,
            TransferError::Joined {
                location_scoped, ..
            } => *location_scoped,
            _ => false,
        }
    }

    /// True when a later attempt at the same candidate might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Timeout { .. } | TransferError::Interrupted { .. } => true,
            TransferError::Joined { retryable, .. } => *retryable,
            TransferError::Cache(CacheError::LockTimeout { .. }) => true,
            _ => false,
        }
    }

    /// Rebuild an owned error from one shared between joined waiters
    ///
    /// Kinds with plain fields come back unchanged. I/O failures become a
    /// transfer failure of `key`; other wrapped library errors are carried
    /// as `Joined` with their message and classification.
    pub fn from_shared(key: &str, shared: &TransferError) -> Self {
        match shared {
            TransferError::Transfer { resource, message } => TransferError::Transfer {
                resource: resource.clone(),
                message: message.clone(),
            },
            TransferError::Location { location, message } => TransferError::Location {
                location: location.clone(),
                message: message.clone(),
            },
            TransferError::Timeout { url, seconds } => TransferError::Timeout {
                url: url.clone(),
                seconds: *seconds,
            },
            TransferError::BadGateway {
                url,
                status,
                message,
            } => TransferError::BadGateway {
                url: url.clone(),
                status: *status,
                message: message.clone(),
            },
            TransferError::Interrupted { url } => TransferError::Interrupted { url: url.clone() },
            TransferError::NotAllowed {
                resource,
                operation,
            } => TransferError::NotAllowed {
                resource: resource.clone(),
                operation: operation.clone(),
            },
            TransferError::Joined {
                key,
                message,
                location_scoped,
                retryable,
            } => TransferError::Joined {
                key: key.clone(),
                message: message.clone(),
                location_scoped: *location_scoped,
                retryable: *retryable,
            },
            TransferError::Cache(CacheError::LockTimeout { path, seconds }) => {
                TransferError::Cache(CacheError::LockTimeout {
                    path: path.clone(),
                    seconds: *seconds,
                })
            }
            TransferError::Io(e) => TransferError::transfer(key, format!("I/O failure: {}", e)),
            other => TransferError::Joined {
                key: key.to_string(),
                message: other.to_string(),
                location_scoped: other.is_location_error(),
                retryable: other.is_retryable(),
            },
        }
    }
}

/// Cache provider and path database errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Waiting for a read or write lock exceeded the budget
    #[error("Lock wait on {path} timed out after {seconds} seconds")]
    LockTimeout { path: String, seconds: u64 },

    /// Requested entry does not exist
    #[error("No cache entry for {path}")]
    NotFound { path: String },

    /// Operation needs a file but the entry is a directory
    #[error("Not a file: {path}")]
    NotAFile { path: String },

    /// Invalid cache state
    #[error("Invalid cache state: {reason}")]
    InvalidState { reason: String },

    /// Path database failure
    #[error("Path database error")]
    Database(#[from] rusqlite::Error),

    /// Reverse-map serialization failure
    #[error("Reverse map serialization error")]
    Serialization(#[from] serde_json::Error),

    /// I/O error on cache storage
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading configuration
    #[error("Failed to read configuration")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Transfer error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transfer(e) => e.is_retryable() || e.is_location_error(),
            AppError::Cache(CacheError::LockTimeout { .. }) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Transfer(_) => "transfer",
            AppError::Cache(_) => "cache",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
