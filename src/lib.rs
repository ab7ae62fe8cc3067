//! # WSI Tiler
//!
//! Turns Whole Slide Images into pyramids of JPEG tiles in durable storage.
//!
//! Slides dropped into a watched directory are decoded level by level. Every
//! level is cut into fixed-size tiles, background tiles are skipped, and the
//! rest are packed into one archive per level which is then committed to a
//! local directory, an S3 bucket or an OpenStack Swift container. A
//! thumbnail and a properties document describing where the tiles live
//! complete each job.
//!
//! ## Architecture
//!
//! - [`watcher`] - Directory watcher and single-worker job queue
//! - [`pyramid`] - Per-slide generation: levels, barrier, thumbnail, properties
//! - [`tile`] - Tile grid, rendering, background filtering and JPEG encoding
//! - [`archive`] - Concurrent-append tar archives, one per level
//! - [`storage`] - Storage backends and URI templates
//! - [`slide`] - Decoder abstraction, raster decoder and slide identity
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wsi_tiler::{LocalConfig, PyramidGenerator, PyramidSettings, RasterSlideOpener, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = StorageConfig::Local(LocalConfig {
//!         root: "pyramids".into(),
//!         base_url: Some("https://tiles.example.org".to_string()),
//!     });
//!     let settings = PyramidSettings::new("/tmp/wsi-work", "properties");
//!     let generator = PyramidGenerator::new(RasterSlideOpener::new(), storage, settings);
//!
//!     let summary = generator.generate(Path::new("inbox/slide.png")).await.unwrap();
//!     println!("{}", summary);
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod pyramid;
pub mod slide;
pub mod storage;
pub mod tile;
pub mod watcher;

// Re-export commonly used types at the crate root
pub use archive::{Archive, ArchiveFormat};
pub use config::{Cli, Command};
pub use error::{ArchiveError, DecodeError, GenerateError, StorageError, TileRenderError, WatchError};
pub use pyramid::{JobSummary, PropertiesDocument, PyramidGenerator, PyramidSettings};
pub use slide::{RasterSlideOpener, SlideDecoder, SlideDescriptor, SlideOpener};
pub use storage::{
    LocalConfig, S3Config, Storage, StorageConfig, StorageFactory, StorageProvider, SwiftConfig,
};
pub use tile::{JpegTileEncoder, LevelGrid, TileRenderer};
pub use watcher::{JobQueue, SlideJob, SlideWatcher};
