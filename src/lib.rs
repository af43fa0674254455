//! Depot Transfer Library
//!
//! A content transfer and caching engine for artifact-repository proxies.
//! Resources resolve against ordered remote locations; concurrent requests
//! for the same resource join a single network operation; content lands in a
//! lock-coordinated file cache or a content-addressed path-mapped store.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
