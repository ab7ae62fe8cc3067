//! Decoder capability for Whole Slide Images.
//!
//! This module defines the `SlideDecoder` trait, the only view the pyramid
//! generator has of a slide file. The decoding library behind it is opaque:
//! it exposes pyramid geometry, raw properties and region painting.
//!
//! # Coordinates
//!
//! Region origins are always expressed in level-0 pixel coordinates, while
//! region sizes are expressed in pixels of the requested level. This mirrors
//! how slide decoding libraries paint regions and is what the tile renderer
//! relies on when it multiplies tile offsets by the level downsample.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use image::Rgb;

use crate::error::DecodeError;

// =============================================================================
// Bounds
// =============================================================================

/// Region of level 0 that actually contains tissue data.
///
/// Some scanners only image part of the glass; the decoder reports the
/// scanned rectangle so empty margins are not tiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideBounds {
    /// Left edge in level-0 pixels
    pub x: u64,

    /// Top edge in level-0 pixels
    pub y: u64,

    /// Width in level-0 pixels
    pub width: u64,

    /// Height in level-0 pixels
    pub height: u64,
}

// =============================================================================
// SlideDecoder Trait
// =============================================================================

/// Read-only handle on an opened slide.
///
/// Implementations must tolerate concurrent `read_region` calls from many
/// renderer threads.
pub trait SlideDecoder: Send + Sync {
    /// Number of pyramid levels. Level 0 is full resolution.
    fn level_count(&self) -> usize;

    /// Dimensions of a level in pixels, or `None` if the level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)>;

    /// Downsample factor of a level relative to level 0.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Raw key/value properties reported by the decoder.
    fn properties(&self) -> BTreeMap<String, String>;

    /// Scanned region of level 0, if the format declares one.
    fn bounds(&self) -> Option<SlideBounds> {
        None
    }

    /// Declared background color of the glass, if any.
    fn background_color(&self) -> Option<Rgb<u8>> {
        None
    }

    /// Paint a region into a premultiplied ARGB buffer (`0xAARRGGBB`).
    ///
    /// `x` and `y` are level-0 coordinates; `width` and `height` are in
    /// pixels of `level`. Pixels outside the slide are fully transparent.
    /// The returned buffer has exactly `width * height` entries in row-major
    /// order.
    fn read_region(
        &self,
        x: u64,
        y: u64,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<Vec<u32>, DecodeError>;

    /// Index of the coarsest level whose downsample does not exceed `downsample`.
    ///
    /// Falls back to level 0 when every level is finer than requested.
    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        let mut best = 0;
        let mut best_factor = 0.0;
        for level in 0..self.level_count() {
            if let Some(factor) = self.level_downsample(level) {
                if factor <= downsample && factor > best_factor {
                    best = level;
                    best_factor = factor;
                }
            }
        }
        best
    }
}

// =============================================================================
// SlideOpener Trait
// =============================================================================

/// Opens slide files into decoder handles.
///
/// Each call returns a fresh handle owned by the caller for the lifetime of
/// one job. Handles are never shared between jobs or cached by file name.
pub trait SlideOpener: Send + Sync + 'static {
    /// Open the slide at `path`.
    fn open(&self, path: &Path) -> Result<Arc<dyn SlideDecoder>, DecodeError>;
}

impl<T: SlideOpener + ?Sized> SlideOpener for Arc<T> {
    fn open(&self, path: &Path) -> Result<Arc<dyn SlideDecoder>, DecodeError> {
        (**self).open(path)
    }
}

// =============================================================================
// Tests
// =============================================================================
