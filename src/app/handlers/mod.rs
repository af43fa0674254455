//! Operation handlers: in-flight join plus negative caching
//!
//! Each handler computes a dedup key (the URL for download/upload, the
//! resource identity for listing/existence), consults the not-found cache,
//! and either joins the job already serving that key or submits a new one
//! to the worker pool. Failures are raised or converted to an empty result
//! according to the caller's `suppress_failures` flag.
//!
//! - [`join`] - In-flight job registry shared by all handlers
//! - [`download`], [`upload`], [`listing`], [`exists`] - The handlers

pub mod download;
pub mod exists;
pub mod join;
pub mod listing;
pub mod upload;

#[cfg(test)]
mod tests;

pub use download::DownloadHandler;
pub use exists::ExistsHandler;
pub use join::JoinRegistry;
pub use listing::ListingHandler;
pub use upload::UploadHandler;
