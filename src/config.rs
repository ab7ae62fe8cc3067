//! Configuration management for the WSI tiler.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `WSI_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `watch <dir>` - Process every slide dropped into a directory
//! - `process <file>` - Process a single slide and exit
//! - `check` - Provision the storage backend and print its URI templates
//!
//! # Environment Variables
//!
//! - `WSI_WATCH_DIR` - Directory to watch for new slides
//! - `WSI_PROPERTIES_DIR` - Where properties documents are written (default: ./properties)
//! - `WSI_WORK_DIR` - Scratch directory for archives (default: system temp dir)
//! - `WSI_WORKERS` - Concurrent tile renders (default: number of CPUs)
//! - `WSI_LEVEL_TIMEOUT` - Seconds allowed per level (default: 1800)
//! - `WSI_TILE_SIZE` - Tile edge in pixels (default: 1024)
//! - `WSI_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `WSI_ARCHIVE_FORMAT` - `tar` or `tar-gz` (default: tar)
//! - `WSI_BACKGROUND_COLOR` - Background of raster slides, hex `RRGGBB`
//! - `WSI_STORAGE` - `local`, `s3` or `swift` (default: local)
//! - `WSI_STORAGE_DIR` / `WSI_STORAGE_BASE_URL` - Local backend settings
//! - `WSI_S3_BUCKET` / `WSI_S3_ENDPOINT` / `WSI_S3_REGION` / `WSI_S3_PUBLIC_URL` - S3 backend
//! - `WSI_SWIFT_AUTH_URL` / `WSI_SWIFT_USER` / `WSI_SWIFT_KEY` / `WSI_SWIFT_CONTAINER` /
//!   `WSI_SWIFT_PUBLIC_URL` - Swift backend

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::Rgb;

use crate::archive::ArchiveFormat;
use crate::pyramid::{PyramidSettings, DEFAULT_TILE_SIZE};
use crate::storage::{LocalConfig, S3Config, StorageConfig, SwiftConfig};
use crate::tile::{is_valid_quality, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-level deadline in seconds (30 minutes).
pub const DEFAULT_LEVEL_TIMEOUT_SECS: u64 = 1800;

/// Default properties directory.
pub const DEFAULT_PROPERTIES_DIR: &str = "properties";

/// Default local storage root.
pub const DEFAULT_STORAGE_DIR: &str = "pyramids";

/// Smallest accepted tile edge.
pub const MIN_TILE_SIZE: u32 = 64;

/// Largest accepted tile edge.
pub const MAX_TILE_SIZE: u32 = 8192;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Tiler - Turns Whole Slide Images into stored tile pyramids.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch a directory and process every slide that appears in it.
    Watch(WatchConfig),

    /// Process a single slide file and exit.
    Process(ProcessConfig),

    /// Provision the storage backend and report its URI templates.
    Check(CheckConfig),
}

/// Arguments of `watch`.
#[derive(Args, Debug, Clone)]
pub struct WatchConfig {
    /// Directory receiving slide files.
    #[arg(env = "WSI_WATCH_DIR")]
    pub watch_dir: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineConfig,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl WatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.watch_dir.is_dir() {
            return Err(format!(
                "Watch directory {} does not exist",
                self.watch_dir.display()
            ));
        }
        self.pipeline.validate()?;
        self.storage.validate()
    }
}

/// Arguments of `process`.
#[derive(Args, Debug, Clone)]
pub struct ProcessConfig {
    /// Slide file to process. It is deleted once its pyramid is stored.
    pub file: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineConfig,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.file.is_file() {
            return Err(format!("Slide file {} does not exist", self.file.display()));
        }
        self.pipeline.validate()?;
        self.storage.validate()
    }
}

/// Arguments of `check`.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Settings of the pyramid generator.
#[derive(Args, Debug, Clone)]
pub struct PipelineConfig {
    /// Directory receiving properties documents.
    #[arg(long, default_value = DEFAULT_PROPERTIES_DIR, env = "WSI_PROPERTIES_DIR")]
    pub properties_dir: PathBuf,

    /// Scratch directory for level archives and thumbnails.
    ///
    /// If not specified, uses a directory under the system temp dir.
    #[arg(long, env = "WSI_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Number of tiles rendered concurrently.
    ///
    /// If not specified, uses the number of CPUs.
    #[arg(long, env = "WSI_WORKERS")]
    pub workers: Option<usize>,

    /// Seconds allowed for all tiles of one level.
    #[arg(long, default_value_t = DEFAULT_LEVEL_TIMEOUT_SECS, env = "WSI_LEVEL_TIMEOUT")]
    pub level_timeout: u64,

    /// Tile edge in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// JPEG quality for tiles and thumbnails (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Container format of level archives.
    #[arg(long, value_enum, default_value_t = ArchiveFormat::Tar, env = "WSI_ARCHIVE_FORMAT")]
    pub archive_format: ArchiveFormat,

    /// Background color of raster slides as hex `RRGGBB`.
    ///
    /// Tiles within 5% of it are skipped. If not specified, every tile is kept.
    #[arg(long, env = "WSI_BACKGROUND_COLOR")]
    pub background_color: Option<String>,
}

impl PipelineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }
        if self.level_timeout == 0 {
            return Err("level_timeout must be greater than 0".to_string());
        }
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between {} and {}",
                MIN_TILE_SIZE, MAX_TILE_SIZE
            ));
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        self.background()?;
        Ok(())
    }

    /// Parsed background color.
    pub fn background(&self) -> Result<Option<Rgb<u8>>, String> {
        self.background_color
            .as_deref()
            .map(parse_hex_color)
            .transpose()
    }

    /// Resolved scratch directory.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("wsi-tiler"))
    }

    /// Generator settings (call validate() first).
    pub fn settings(&self) -> PyramidSettings {
        let mut settings = PyramidSettings::new(self.work_dir(), self.properties_dir.clone())
            .with_tile_size(self.tile_size)
            .with_jpeg_quality(self.jpeg_quality)
            .with_level_timeout(Duration::from_secs(self.level_timeout))
            .with_archive_format(self.archive_format);
        if let Some(workers) = self.workers {
            settings = settings.with_workers(workers);
        }
        settings
    }
}

/// Parse `RRGGBB`, with or without a leading `#`.
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>, String> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("Invalid color '{}': expected RRGGBB", value));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| format!("Invalid color '{}': expected RRGGBB", value))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StorageBackend {
    /// Local directory
    #[default]
    Local,
    /// S3 or S3-compatible bucket
    S3,
    /// OpenStack Swift container
    Swift,
}

/// Storage backend settings.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Storage backend receiving tiles and thumbnails.
    #[arg(long, value_enum, default_value_t = StorageBackend::Local, env = "WSI_STORAGE")]
    pub storage: StorageBackend,

    /// Root directory of the local backend.
    #[arg(long, default_value = DEFAULT_STORAGE_DIR, env = "WSI_STORAGE_DIR")]
    pub storage_dir: PathBuf,

    /// Public base URL of the local root.
    ///
    /// If not specified, uses a `file://` URL.
    #[arg(long, env = "WSI_STORAGE_BASE_URL")]
    pub storage_base_url: Option<String>,

    /// S3 bucket name.
    #[arg(long, env = "WSI_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "WSI_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "WSI_S3_REGION")]
    pub s3_region: String,

    /// Public base URL of the bucket.
    #[arg(long, env = "WSI_S3_PUBLIC_URL")]
    pub s3_public_url: Option<String>,

    /// Swift v1 authentication URL.
    #[arg(long, env = "WSI_SWIFT_AUTH_URL")]
    pub swift_auth_url: Option<String>,

    /// Swift user (`account:user`).
    #[arg(long, env = "WSI_SWIFT_USER")]
    pub swift_user: Option<String>,

    /// Swift key.
    #[arg(long, env = "WSI_SWIFT_KEY", hide_env_values = true)]
    pub swift_key: Option<String>,

    /// Swift container name.
    #[arg(long, env = "WSI_SWIFT_CONTAINER")]
    pub swift_container: Option<String>,

    /// Public base URL of the container.
    #[arg(long, env = "WSI_SWIFT_PUBLIC_URL")]
    pub swift_public_url: Option<String>,
}

impl StorageArgs {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.storage_config().map(|_| ())
    }

    /// Build the backend settings.
    pub fn storage_config(&self) -> Result<StorageConfig, String> {
        match self.storage {
            StorageBackend::Local => Ok(StorageConfig::Local(LocalConfig {
                root: self.storage_dir.clone(),
                base_url: self.storage_base_url.clone(),
            })),
            StorageBackend::S3 => Ok(StorageConfig::S3(S3Config {
                bucket: required(&self.s3_bucket, "--s3-bucket", "WSI_S3_BUCKET")?,
                endpoint: self.s3_endpoint.clone(),
                region: self.s3_region.clone(),
                public_url: self.s3_public_url.clone(),
            })),
            StorageBackend::Swift => Ok(StorageConfig::Swift(SwiftConfig {
                auth_url: required(&self.swift_auth_url, "--swift-auth-url", "WSI_SWIFT_AUTH_URL")?,
                user: required(&self.swift_user, "--swift-user", "WSI_SWIFT_USER")?,
                key: required(&self.swift_key, "--swift-key", "WSI_SWIFT_KEY")?,
                container: required(
                    &self.swift_container,
                    "--swift-container",
                    "WSI_SWIFT_CONTAINER",
                )?,
                public_url: self.swift_public_url.clone(),
            })),
        }
    }
}

fn required(value: &Option<String>, flag: &str, env: &str) -> Result<String, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(format!("{} is required. Set {} or {}", &flag[2..], flag, env)),
    }
}

// =============================================================================
// Tests
// =============================================================================
