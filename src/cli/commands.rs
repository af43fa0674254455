//! Command handlers for the Depot Transfer CLI
//!
//! Each handler loads the configuration, starts an [`Engine`], runs one
//! manager operation and prints its outcome.

use std::path::Path;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use crate::app::resource::{ConcreteResource, Resource};
use crate::app::transfer::{FileReader, Transfer};
use crate::cli::{BatchArgs, DeleteArgs, FetchArgs, GcArgs, GlobalArgs, ListArgs, StoreArgs};
use crate::cli::startup::Engine;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

async fn start_engine(global: &GlobalArgs) -> Result<Engine> {
    let config = AppConfig::load(global.config.clone()).await?;
    Engine::start(&config, global.cache_dir.clone()).await
}

/// Handle the fetch command
pub async fn handle_fetch(global: &GlobalArgs, args: FetchArgs) -> Result<()> {
    let engine = start_engine(global).await?;
    let result = fetch(&engine, &args).await;
    engine.shutdown().await;
    result
}

async fn fetch(engine: &Engine, args: &FetchArgs) -> Result<()> {
    let resource = engine.resolve(args.location.as_deref(), &args.path)?;

    if args.exists {
        let exists = engine.manager.exists(&resource).await?;
        println!("{}: {}", resource, if exists { "present" } else { "absent" });
        return Ok(());
    }

    let start = Instant::now();
    let transfer = match &resource {
        Resource::Concrete(concrete) => engine.manager.retrieve(concrete, false).await?,
        Resource::Virtual(candidates) => engine.manager.retrieve_first(candidates).await?,
    };

    match transfer {
        Some(transfer) => {
            let length = transfer.length().await?.unwrap_or(0);
            info!("Retrieved {} in {:?}", transfer, start.elapsed());
            match &args.output {
                Some(output) => {
                    copy_out(&transfer, output).await?;
                    println!("{} -> {} ({} bytes)", transfer, output.display(), length);
                }
                None => println!("{} ({} bytes)", transfer, length),
            }
            Ok(())
        }
        None => Err(AppError::generic(format!("Not found: {}", resource))),
    }
}

async fn copy_out(transfer: &Transfer, output: &Path) -> Result<()> {
    let content = transfer.read_to_vec().await?;
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output, content).await?;
    Ok(())
}

/// Handle the batch command
pub async fn handle_batch(global: &GlobalArgs, args: BatchArgs) -> Result<()> {
    let paths = args.collect_paths().await?;
    let engine = start_engine(global).await?;

    let resources = paths
        .iter()
        .map(|path| engine.resolve(args.location.as_deref(), path))
        .collect::<Result<Vec<_>>>();
    let resources = match resources {
        Ok(resources) => resources,
        Err(e) => {
            engine.shutdown().await;
            return Err(e);
        }
    };

    let start = Instant::now();
    let batch = engine.manager.batch_retrieve(resources).await;

    for resource in batch.resources() {
        if let Some(transfer) = batch.transfer(resource) {
            println!("OK       {}", transfer);
        } else if let Some(error) = batch.error(resource) {
            println!("FAILED   {}: {}", resource, error);
        } else {
            println!("MISSING  {}", resource);
        }
    }
    println!(
        "\n{} retrieved, {} failed, {} missing in {:.1}s",
        batch.transfers().len(),
        batch.errors().len(),
        batch.missing().len(),
        start.elapsed().as_secs_f64()
    );

    let failed = batch.errors().len();
    engine.shutdown().await;
    if failed > 0 {
        return Err(AppError::generic(format!("{} resources failed", failed)));
    }
    Ok(())
}

/// Handle the list command
pub async fn handle_list(global: &GlobalArgs, args: ListArgs) -> Result<()> {
    let engine = start_engine(global).await?;
    let listed = match engine.resolve(args.location.as_deref(), &args.path) {
        Ok(Resource::Concrete(directory)) => engine.manager.list(&directory).await.map_err(AppError::from),
        Ok(Resource::Virtual(directories)) => {
            engine.manager.list_all(&directories).await.map_err(AppError::from)
        }
        Err(e) => Err(e),
    };
    engine.shutdown().await;

    for name in listed? {
        println!("{}", name);
    }
    Ok(())
}

/// Handle the store command
pub async fn handle_store(global: &GlobalArgs, args: StoreArgs) -> Result<()> {
    let engine = start_engine(global).await?;
    let result = store(&engine, &args).await;
    engine.shutdown().await;
    result
}

async fn store(engine: &Engine, args: &StoreArgs) -> Result<()> {
    let resource = ConcreteResource::new(engine.location(&args.location)?, &args.path);
    let file = tokio::fs::File::open(&args.file).await?;
    let mut reader = FileReader::new(file);

    if args.publish {
        if engine.manager.publish(&resource, &mut reader).await? {
            println!("Published {}", resource);
        } else {
            warn!("Remote did not accept {}", resource);
            println!("Stored {} (remote rejected the upload)", resource);
        }
    } else {
        let transfer = engine.manager.store(&resource, &mut reader).await?;
        println!("Stored {}", transfer);
    }
    Ok(())
}

/// Handle the delete command
pub async fn handle_delete(global: &GlobalArgs, args: DeleteArgs) -> Result<()> {
    let engine = start_engine(global).await?;
    let deleted = match engine.location(&args.location) {
        Ok(location) => {
            let resource = ConcreteResource::new(location, &args.path);
            engine.manager.delete(&resource).await.map_err(AppError::from)
        }
        Err(e) => Err(e),
    };
    engine.shutdown().await;

    if deleted? {
        println!("Deleted {}:{}", args.location, args.path);
    } else {
        println!("Nothing cached at {}:{}", args.location, args.path);
    }
    Ok(())
}

/// Handle the gc command
pub async fn handle_gc(global: &GlobalArgs, args: GcArgs) -> Result<()> {
    let engine = start_engine(global).await?;
    let report = match &engine.store {
        Some(store) if args.all => store
            .gc(Utc::now() + ChronoDuration::seconds(1))
            .await
            .map_err(AppError::from),
        Some(store) => store.gc_expired().await.map_err(AppError::from),
        None => Err(AppError::generic(
            "Garbage collection requires storage.kind = \"path-mapped\"",
        )),
    };
    engine.shutdown().await;

    println!("{}", report?);
    Ok(())
}

/// Handle the locations command
pub async fn handle_locations(global: &GlobalArgs) -> Result<()> {
    let config = AppConfig::load(global.config.clone()).await?;
    if config.locations.is_empty() {
        println!("No locations configured");
        return Ok(());
    }

    println!(
        "{:<16} {:<8} {:<8} {:<8} {}",
        "NAME", "FETCH", "STORE", "PUBLISH", "URI"
    );
    for location in &config.locations {
        println!(
            "{:<16} {:<8} {:<8} {:<8} {}",
            location.name,
            yes_no(location.allows_downloading),
            yes_no(location.allows_storing),
            yes_no(location.allows_publishing),
            location.uri
        );
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Handle the init command
pub async fn handle_init() -> Result<()> {
    match AppConfig::initialize_first_run().await? {
        Some(path) => println!("Configuration file: {}", path.display()),
        None => println!("No configuration file written"),
    }
    Ok(())
}
