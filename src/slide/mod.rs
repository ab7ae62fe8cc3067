//! Slide abstraction layer.
//!
//! The pyramid generator never touches slide bytes directly. It goes through
//! the decoder capability defined here:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           PyramidGenerator              │
//! └────────────────────┬────────────────────┘
//!                      │ open(path)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideOpener Trait             │
//! └────────────────────┬────────────────────┘
//!                      │ one handle per job
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideDecoder Trait            │
//! │  (geometry, properties, read_region)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │  RasterSlide (image crate) / vendor     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! [`SlideDescriptor`] is the geometry snapshot taken at job start and
//! [`resolve_slide_id`] assigns the id under which all artifacts are stored.

mod descriptor;
mod identity;
mod raster;
mod reader;

pub use descriptor::{LevelInfo, SlideDescriptor};
pub use identity::{existing_slide_id, resolve_slide_id};
pub use raster::{RasterSlide, RasterSlideOpener, MIN_LEVEL_EDGE, RASTER_VENDOR};
pub use reader::{SlideBounds, SlideDecoder, SlideOpener};
