//! JPEG tile encoder.
//!
//! Kept tiles are compressed with a lossy JPEG encoder before they are
//! archived. Quality is expressed on the usual 1-100 scale; out-of-range
//! values are clamped rather than rejected.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::TileRenderError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// JPEG Encoder
// =============================================================================

/// Encodes opaque RGB canvases as JPEG at a fixed quality.
///
/// # Example
///
/// ```
/// use image::RgbImage;
/// use wsi_tiler::tile::JpegTileEncoder;
///
/// let encoder = JpegTileEncoder::new(85);
/// let canvas = RgbImage::new(16, 16);
/// let jpeg = encoder.encode(&canvas).unwrap();
/// assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct JpegTileEncoder {
    quality: u8,
}

impl Default for JpegTileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegTileEncoder {
    /// Create an encoder; `quality` is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    /// Quality this encoder writes at.
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Compress a canvas.
    ///
    /// # Errors
    ///
    /// Returns [`TileRenderError::Encode`] if the encoder rejects the canvas.
    pub fn encode(&self, canvas: &RgbImage) -> Result<Bytes, TileRenderError> {
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);

        encoder
            .encode_image(canvas)
            .map_err(|e| TileRenderError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
