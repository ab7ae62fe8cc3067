//! Slide thumbnails.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::DecodeError;
use crate::slide::{SlideDecoder, SlideDescriptor};
use crate::tile::compose_canvas;

/// Longest edge of a generated thumbnail, in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 500;

/// Render a thumbnail of the scanned region whose longest edge is at most
/// `max_edge`.
///
/// Reads the coarsest level that is still at least as large as the
/// thumbnail, then scales down. Slides smaller than `max_edge` are returned
/// at full resolution.
pub fn render_thumbnail(
    decoder: &dyn SlideDecoder,
    descriptor: &SlideDescriptor,
    max_edge: u32,
) -> Result<RgbImage, DecodeError> {
    let (width, height) = descriptor
        .bounded_level_size(0)
        .ok_or(DecodeError::NoLevels)?;
    let longest = width.max(height);
    if longest == 0 || max_edge == 0 {
        return Err(DecodeError::Region {
            level: 0,
            message: "slide has an empty scanned region".to_string(),
        });
    }

    let target_downsample = longest as f64 / max_edge as f64;
    let level = decoder.best_level_for_downsample(target_downsample);
    let (level_width, level_height) =
        descriptor
            .bounded_level_size(level)
            .ok_or(DecodeError::LevelOutOfRange {
                level,
                count: descriptor.level_count(),
            })?;
    let oversized = || DecodeError::Region {
        level,
        message: format!("level {level_width}x{level_height} is too large to thumbnail"),
    };
    let level_width = u32::try_from(level_width.max(1)).map_err(|_| oversized())?;
    let level_height = u32::try_from(level_height.max(1)).map_err(|_| oversized())?;

    let (x, y) = descriptor.offset();
    let argb = decoder.read_region(x, y, level, level_width, level_height)?;
    let canvas = compose_canvas(&argb, level_width, level_height, descriptor.background);

    let level_longest = level_width.max(level_height);
    if level_longest <= max_edge {
        return Ok(canvas);
    }

    let scale = max_edge as f64 / level_longest as f64;
    let thumb_width = ((level_width as f64 * scale).round() as u32).max(1);
    let thumb_height = ((level_height as f64 * scale).round() as u32).max(1);
    Ok(imageops::resize(
        &canvas,
        thumb_width,
        thumb_height,
        FilterType::Triangle,
    ))
}
