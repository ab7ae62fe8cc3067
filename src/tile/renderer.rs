//! Per-tile rendering.
//!
//! A [`TileRenderer`] turns one [`TileJob`] into at most one archive entry:
//!
//! ```text
//! TileJob ──► read_region (ARGB) ──► compose on RGB canvas
//!                                        │
//!                         background? ───┤── yes ──► skipped
//!                                        │
//!                                        ▼ no
//!                                 JPEG encode ──► Archive::add_tile
//! ```
//!
//! Rendering never fails a level. Every error is logged with the tile
//! coordinates and reported as [`TileOutcome::Failed`].

use std::sync::Arc;

use image::{Rgb, RgbImage};
use tracing::warn;

use crate::archive::Archive;
use crate::error::TileRenderError;
use crate::slide::SlideDecoder;
use crate::storage::template::{expand_tile, TileCoordinates};

use super::encoder::JpegTileEncoder;
use super::grid::TileJob;

/// Lower edge of the background tolerance band, as a fraction of the color.
pub const BACKGROUND_LOWER: f64 = 0.95;

/// Upper edge of the background tolerance band, as a fraction of the color.
pub const BACKGROUND_UPPER: f64 = 1.05;

/// Fraction of differing pixels a tile must exceed to be kept.
pub const FOREGROUND_FRACTION: f64 = 0.01;

// =============================================================================
// Tile Outcome
// =============================================================================

/// What happened to one submitted tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Encoded and appended to the archive
    Written,
    /// Indistinguishable from the background, not archived
    Background,
    /// Clipped to zero size at the slide edge
    Empty,
    /// Rendering failed; the tile is missing from the output
    Failed,
}

// =============================================================================
// Compositing
// =============================================================================

/// Composite a premultiplied ARGB buffer onto an opaque RGB canvas.
///
/// With a background color the canvas is filled with it first and the
/// buffer is drawn over it. Without one the buffer's color channels are
/// taken as-is and alpha is dropped.
pub fn compose_canvas(
    argb: &[u32],
    width: u32,
    height: u32,
    background: Option<Rgb<u8>>,
) -> RgbImage {
    let mut canvas = RgbImage::new(width, height);

    for (pixel, &src) in canvas.pixels_mut().zip(argb) {
        let a = (src >> 24) & 0xFF;
        let r = (src >> 16) & 0xFF;
        let g = (src >> 8) & 0xFF;
        let b = src & 0xFF;

        *pixel = match background {
            Some(Rgb([br, bg, bb])) => {
                let over = |c: u32, base: u8| {
                    let blended = c + (base as u32 * (255 - a) + 127) / 255;
                    blended.min(255) as u8
                };
                Rgb([over(r, br), over(g, bg), over(b, bb)])
            }
            None => Rgb([r as u8, g as u8, b as u8]),
        };
    }

    canvas
}

// =============================================================================
// Background Filter
// =============================================================================

/// Classifies tiles against a declared background color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundFilter {
    lower: [f64; 3],
    upper: [f64; 3],
}

impl BackgroundFilter {
    /// Build the ±5% tolerance band around `color`, clamped to 0-255.
    pub fn new(color: Rgb<u8>) -> Self {
        let band = |factor: f64| color.0.map(|c| (c as f64 * factor).clamp(0.0, 255.0));
        Self {
            lower: band(BACKGROUND_LOWER),
            upper: band(BACKGROUND_UPPER),
        }
    }

    /// Whether a pixel falls outside the band on any channel.
    pub fn differs(&self, pixel: &Rgb<u8>) -> bool {
        pixel.0.iter().enumerate().any(|(i, &c)| {
            let c = c as f64;
            c < self.lower[i] || c > self.upper[i]
        })
    }

    /// Number of pixels outside the band.
    pub fn differing_pixels(&self, canvas: &RgbImage) -> usize {
        canvas.pixels().filter(|p| self.differs(p)).count()
    }

    /// Whether the tile is background.
    ///
    /// A tile is kept only if strictly more than 1% of its pixels differ
    /// from the background; exactly 1% is still background.
    pub fn is_background(&self, canvas: &RgbImage) -> bool {
        let total = canvas.width() as usize * canvas.height() as usize;
        let differing = self.differing_pixels(canvas);
        differing as f64 <= total as f64 * FOREGROUND_FRACTION
    }
}

// =============================================================================
// Tile Renderer
// =============================================================================

/// Renders the tiles of one level into that level's archive.
///
/// One renderer is shared by every task of a level; it holds no per-tile
/// state and is safe to call from many threads at once.
pub struct TileRenderer {
    slide_id: String,
    decoder: Arc<dyn SlideDecoder>,
    archive: Arc<Archive>,
    encoder: JpegTileEncoder,
    naming_format: String,
    background: Option<Rgb<u8>>,
    filter: Option<BackgroundFilter>,
}

impl TileRenderer {
    /// Create a renderer for one level of a slide.
    pub fn new(
        slide_id: impl Into<String>,
        decoder: Arc<dyn SlideDecoder>,
        archive: Arc<Archive>,
        encoder: JpegTileEncoder,
        naming_format: impl Into<String>,
        background: Option<Rgb<u8>>,
    ) -> Self {
        Self {
            slide_id: slide_id.into(),
            decoder,
            archive,
            encoder,
            naming_format: naming_format.into(),
            background,
            filter: background.map(BackgroundFilter::new),
        }
    }

    /// Archive entry name for a job.
    pub fn entry_name(&self, job: &TileJob) -> String {
        expand_tile(
            &self.naming_format,
            &TileCoordinates {
                id: &self.slide_id,
                level: job.level,
                x: job.x,
                y: job.y,
                width: job.width,
                height: job.height,
            },
        )
    }

    /// Render one tile. Never fails: errors are logged and reported as
    /// [`TileOutcome::Failed`].
    pub fn render(&self, job: &TileJob) -> TileOutcome {
        match self.try_render(job) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    slide_id = %self.slide_id,
                    level = job.level,
                    x = job.x,
                    y = job.y,
                    width = job.width,
                    height = job.height,
                    error = %e,
                    "Tile render failed"
                );
                TileOutcome::Failed
            }
        }
    }

    /// Paint and composite a tile without classifying or archiving it.
    pub fn paint(&self, job: &TileJob) -> Result<RgbImage, TileRenderError> {
        let argb = self
            .decoder
            .read_region(job.x, job.y, job.level, job.width, job.height)?;
        Ok(compose_canvas(&argb, job.width, job.height, self.background))
    }

    fn try_render(&self, job: &TileJob) -> Result<TileOutcome, TileRenderError> {
        if job.is_empty() {
            return Ok(TileOutcome::Empty);
        }

        let canvas = self.paint(job)?;

        if let Some(filter) = &self.filter {
            if filter.is_background(&canvas) {
                return Ok(TileOutcome::Background);
            }
        }

        let jpeg = self.encoder.encode(&canvas)?;
        self.archive.add_tile(&self.entry_name(job), &jpeg)?;
        Ok(TileOutcome::Written)
    }
}

// =============================================================================
// Tests
// =============================================================================
