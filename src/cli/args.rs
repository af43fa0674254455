//! Command-line argument parsing for Depot Transfer
//!
//! This module defines the CLI structure using clap derive macros. Resource
//! arguments are repository paths; without `--location` they resolve against
//! every configured location in order.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Depot Transfer - fetch, cache and publish repository content
#[derive(Parser, Debug)]
#[command(
    name = "depot_transfer",
    version,
    about = "Fetch and cache artifact repository content with location fallback",
    long_about = "A caching transfer engine for artifact repositories.
Resolves paths against ordered remote locations, joins concurrent requests for
the same resource and keeps content in a local file cache or path-mapped store."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path, overriding `storage.cache_root`
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve one resource, trying locations in order
    Fetch(FetchArgs),

    /// Retrieve many resources concurrently
    Batch(BatchArgs),

    /// List a directory across cache and remote
    List(ListArgs),

    /// Store a local file into the cache, optionally publishing it
    Store(StoreArgs),

    /// Delete cached content
    Delete(DeleteArgs),

    /// Reclaim unreferenced blobs of the path-mapped store
    Gc(GcArgs),

    /// Show configured locations
    Locations,

    /// Write a default configuration file
    Init,
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Repository path (e.g. "/org/foo/1.0/foo-1.0.pom")
    pub path: String,

    /// Only try this location
    #[arg(short, long)]
    pub location: Option<String>,

    /// Copy the content to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Only check existence, do not download
    #[arg(long)]
    pub exists: bool,
}

/// Arguments for the batch command
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Repository paths
    #[arg(required_unless_present = "from_file")]
    pub paths: Vec<String>,

    /// Read additional paths from a file, one per line
    #[arg(short = 'f', long, value_name = "FILE")]
    pub from_file: Option<PathBuf>,

    /// Only try this location
    #[arg(short, long)]
    pub location: Option<String>,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Directory path
    #[arg(default_value = "/")]
    pub path: String,

    /// Only list this location
    #[arg(short, long)]
    pub location: Option<String>,
}

/// Arguments for the store command
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Target location
    #[arg(short, long)]
    pub location: String,

    /// Target repository path
    pub path: String,

    /// Local file to store
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Also upload to the remote
    #[arg(long)]
    pub publish: bool,
}

/// Arguments for the delete command
#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Location the content is cached for
    #[arg(short, long)]
    pub location: String,

    /// Repository path; directories are removed recursively
    pub path: String,
}

/// Arguments for the gc command
#[derive(Args, Debug, Clone)]
pub struct GcArgs {
    /// Ignore the grace period and reclaim everything queued
    #[arg(long)]
    pub all: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl BatchArgs {
    /// Paths from the command line followed by those from `--from-file`
    pub async fn collect_paths(&self) -> std::io::Result<Vec<String>> {
        let mut paths = self.paths.clone();
        if let Some(file) = &self.from_file {
            let content = tokio::fs::read_to_string(file).await?;
            paths.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(String::from),
            );
        }
        Ok(paths)
    }
}
