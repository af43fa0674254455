//! Depot Transfer CLI application
//!
//! Command-line front end for the transfer engine: fetch with location
//! fallback, batch retrieval, listings, storing, deletion and store reclaim.

use std::process;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use depot_transfer::cli::{
    Cli, Commands, handle_batch, handle_delete, handle_fetch, handle_gc, handle_init, handle_list,
    handle_locations, handle_store,
};
use depot_transfer::config::{AppConfig, LoggingConfig};
use depot_transfer::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // Config errors surface again when the command loads it
    let logging = AppConfig::load(cli.global.config.clone())
        .await
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(&cli, &logging);

    info!("Depot Transfer v{} starting", env!("CARGO_PKG_VERSION"));

    let global = &cli.global;
    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(global, args).await
        }
        Commands::Batch(args) => {
            info!("Executing batch command");
            handle_batch(global, args).await
        }
        Commands::List(args) => {
            info!("Executing list command");
            handle_list(global, args).await
        }
        Commands::Store(args) => {
            info!("Executing store command");
            handle_store(global, args).await
        }
        Commands::Delete(args) => {
            info!("Executing delete command");
            handle_delete(global, args).await
        }
        Commands::Gc(args) => {
            info!("Executing gc command");
            handle_gc(global, args).await
        }
        Commands::Locations => handle_locations(global).await,
        Commands::Init => handle_init().await,
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let flags_given = cli.global.quiet || cli.global.verbose || cli.global.very_verbose;
    let log_level = if flags_given {
        cli.log_level().to_string().to_lowercase()
    } else {
        logging.level.clone()
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("depot_transfer={}", log_level).parse() {
        filter = filter.add_directive(directive);
    }

    fmt()
        .with_env_filter(filter)
        .with_target(logging.show_target)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
