//! Geometry snapshot of an opened slide.

use image::Rgb;

use crate::error::DecodeError;

use super::reader::{SlideBounds, SlideDecoder};

/// Geometry of one pyramid level as reported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u64,

    /// Height of this level in pixels
    pub height: u64,

    /// Downsample factor relative to level 0
    pub downsample: f64,
}

/// Everything the generator needs to know about a slide, read once at job start.
///
/// Not persisted; rebuilt from the decoder for every job.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideDescriptor {
    /// Per-level geometry, index 0 is full resolution
    pub levels: Vec<LevelInfo>,

    /// Scanned region of level 0, if declared
    pub bounds: Option<SlideBounds>,

    /// Declared background color, if any
    pub background: Option<Rgb<u8>>,
}

impl SlideDescriptor {
    /// Read the descriptor from a decoder.
    ///
    /// Fails with [`DecodeError::NoLevels`] when the decoder reports an empty
    /// pyramid.
    pub fn from_decoder(decoder: &dyn SlideDecoder) -> Result<Self, DecodeError> {
        let count = decoder.level_count();
        if count == 0 {
            return Err(DecodeError::NoLevels);
        }

        let levels = (0..count)
            .map(|level| {
                let (width, height) = decoder
                    .level_dimensions(level)
                    .ok_or(DecodeError::LevelOutOfRange { level, count })?;
                let downsample = decoder
                    .level_downsample(level)
                    .ok_or(DecodeError::LevelOutOfRange { level, count })?;
                Ok(LevelInfo {
                    width,
                    height,
                    downsample,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok(Self {
            levels,
            bounds: decoder.bounds(),
            background: decoder.background_color(),
        })
    }

    /// Number of pyramid levels (always at least 1).
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Full-resolution dimensions.
    pub fn dimensions(&self) -> (u64, u64) {
        (self.levels[0].width, self.levels[0].height)
    }

    /// Level-0 offset of the scanned region, `(0, 0)` without bounds.
    pub fn offset(&self) -> (u64, u64) {
        self.bounds.map(|b| (b.x, b.y)).unwrap_or((0, 0))
    }

    /// Ratio of the bounds size to the level-0 size, per axis.
    ///
    /// Defaults to 1 on an axis without bounds or with a zero-sized level.
    pub fn bounds_multiplier(&self) -> (f64, f64) {
        let (width, height) = self.dimensions();
        match self.bounds {
            Some(b) => (ratio(b.width, width), ratio(b.height, height)),
            None => (1.0, 1.0),
        }
    }

    /// Size of a level restricted to the scanned region.
    pub fn bounded_level_size(&self, level: usize) -> Option<(u64, u64)> {
        let info = self.levels.get(level)?;
        let (mx, my) = self.bounds_multiplier();
        Some((
            (info.width as f64 * mx) as u64,
            (info.height as f64 * my) as u64,
        ))
    }

    /// Downsample of a level truncated to an integer, never below 1.
    pub fn integer_downsample(&self, level: usize) -> Option<u64> {
        self.levels
            .get(level)
            .map(|info| (info.downsample as u64).max(1))
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if part == 0 || whole == 0 {
        1.0
    } else {
        part as f64 / whole as f64
    }
}
