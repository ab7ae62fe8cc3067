//! WSI Tiler - Turns Whole Slide Images into stored tile pyramids.
//!
//! This binary wires configuration, storage and the pyramid generator
//! together for the `watch`, `process` and `check` commands.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    config::{CheckConfig, Cli, Command, PipelineConfig, ProcessConfig, StorageArgs, WatchConfig},
    JobQueue, PyramidGenerator, RasterSlideOpener, Storage, StorageConfig, StorageProvider,
    SlideWatcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Watch(config) => run_watch(config).await,
        Command::Process(config) => run_process(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Watch Command
// =============================================================================

async fn run_watch(config: WatchConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(generator) = build_generator(&config.pipeline, &config.storage) else {
        return ExitCode::FAILURE;
    };

    let (queue, _worker) = JobQueue::start(generator);
    let watcher = SlideWatcher::new(&config.watch_dir, queue);

    tokio::select! {
        result = watcher.run() => {
            if let Err(e) = result {
                error!("Watcher stopped: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = shutdown_signal() => {}
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}

// =============================================================================
// Process Command
// =============================================================================

async fn run_process(config: ProcessConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(generator) = build_generator(&config.pipeline, &config.storage) else {
        return ExitCode::FAILURE;
    };

    match generator.generate(&config.file).await {
        Ok(summary) => {
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{}", json),
                Err(_) => println!("{}", summary),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Processing {} failed: {}", config.file.display(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    // Initialize minimal logging for check command
    if config.verbose {
        init_logging(true);
    }

    println!("WSI Tiler Configuration Check");
    println!("═════════════════════════════");
    println!();

    let storage_config = match config.storage.storage_config() {
        Ok(c) => {
            println!("✓ Backend: {}", c.backend());
            c
        }
        Err(e) => {
            println!("✗ Backend: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!();

    print!("Provisioning storage... ");
    match Storage::connect(&storage_config).await {
        Ok(storage) => {
            println!("✓ success");
            println!();
            println!("Tiles URI:     {}", storage.tiles_uri());
            println!("Thumbnail URI: {}", storage.thumbnail_uri());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("✗ failed");
            println!();
            println!("Error: {}", e);
            println!();
            println!("Please check:");
            println!("  - The backend credentials are configured correctly");
            println!("  - The bucket, container or directory can be created");
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn build_generator(
    pipeline: &PipelineConfig,
    storage: &StorageArgs,
) -> Option<PyramidGenerator<RasterSlideOpener, StorageConfig>> {
    let storage_config = match storage.storage_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return None;
        }
    };
    let background = match pipeline.background() {
        Ok(b) => b,
        Err(e) => {
            error!("Configuration error: {}", e);
            return None;
        }
    };

    let settings = pipeline.settings();
    info!("Configuration:");
    info!("  Storage: {}", storage_config.backend());
    info!("  Tile size: {}", settings.tile_size);
    info!("  Workers: {}", settings.workers);
    info!("  Level timeout: {}s", settings.level_timeout.as_secs());
    info!("  Archive format: {}", settings.archive_format.extension());
    info!("  Work dir: {}", settings.work_dir.display());
    info!("  Properties dir: {}", settings.properties_dir.display());

    Some(PyramidGenerator::new(
        RasterSlideOpener::new().with_background(background),
        storage_config,
        settings,
    ))
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
