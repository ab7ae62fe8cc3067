//! Pyramid generation.
//!
//! One job turns one slide file into stored artifacts:
//!
//! ```text
//! slide file ──► SlideOpener ──► SlideDescriptor
//!                                     │
//!            ┌────────────────────────┘
//!            ▼   for level = L-1 .. 0
//!     ┌─────────────┐   tile tasks   ┌──────────────┐
//!     │  LevelGrid  │ ─────────────► │ worker pool  │ ──► Archive (level)
//!     └─────────────┘                └──────────────┘        │
//!                                    barrier / deadline      ▼
//!                                                    save ─► StorageProvider
//!            │
//!            ▼
//!     thumbnail ─► StorageProvider
//!     properties document ─► <properties dir>/<id>.json
//!     source file removed
//! ```
//!
//! The worker pool is a semaphore scoped to the job and reused by every
//! level, so at most `workers` tiles are painted at once.

mod generator;
mod properties;
mod summary;
mod thumbnail;

pub use generator::{PyramidGenerator, PyramidSettings, DEFAULT_LEVEL_TIMEOUT, DEFAULT_TILE_SIZE};
pub use properties::{
    tile_height_key, tile_width_key, PropertiesDocument, THUMBNAIL_URI_KEY, TILES_URI_KEY,
};
pub use summary::{JobSummary, LevelSummary, TileTally};
pub use thumbnail::{render_thumbnail, THUMBNAIL_MAX_EDGE};
