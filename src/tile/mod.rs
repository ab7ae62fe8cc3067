//! Tile layer.
//!
//! This module turns pyramid levels into archived JPEG tiles.
//!
//! # Components
//!
//! - [`LevelGrid`]: Tile layout of one level, yields [`TileJob`]s
//! - [`TileRenderer`]: Paints, classifies, encodes and archives one tile
//! - [`BackgroundFilter`]: ±5% band test against the declared background color
//! - [`JpegTileEncoder`]: Lossy compression of composited canvases
//!
//! # Example
//!
//! ```
//! use wsi_tiler::slide::{LevelInfo, SlideDescriptor};
//! use wsi_tiler::tile::LevelGrid;
//!
//! let descriptor = SlideDescriptor {
//!     levels: vec![LevelInfo { width: 2048, height: 1500, downsample: 1.0 }],
//!     bounds: None,
//!     background: None,
//! };
//!
//! let grid = LevelGrid::new(&descriptor, 0, 1024).unwrap();
//! assert_eq!((grid.rows(), grid.cols()), (2, 2));
//!
//! for job in grid.jobs().filter(|job| !job.is_empty()) {
//!     println!("tile at {},{} size {}x{}", job.x, job.y, job.width, job.height);
//! }
//! ```

mod encoder;
mod grid;
mod renderer;

pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use grid::{LevelGrid, TileJob};
pub use renderer::{
    compose_canvas, BackgroundFilter, TileOutcome, TileRenderer, BACKGROUND_LOWER,
    BACKGROUND_UPPER, FOREGROUND_FRACTION,
};
