//! Raster-backed slide decoder.
//!
//! Opens ordinary single-resolution images (TIFF, JPEG, PNG) with the `image`
//! crate and synthesizes a power-of-two pyramid so they can flow through the
//! same pipeline as scanner files. Vendor-specific decoders plug in through
//! the same [`SlideOpener`] trait.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageReader, Rgb, RgbaImage};
use tracing::debug;

use crate::error::DecodeError;

use super::reader::{SlideDecoder, SlideOpener};

/// Levels stop being synthesized once the longest edge is at or below this.
pub const MIN_LEVEL_EDGE: u32 = 512;

/// Vendor string reported in the properties of raster slides.
pub const RASTER_VENDOR: &str = "generic-raster";

// =============================================================================
// Opener
// =============================================================================

/// Opens raster images as slides.
#[derive(Debug, Clone, Default)]
pub struct RasterSlideOpener {
    background: Option<Rgb<u8>>,
}

impl RasterSlideOpener {
    /// Create an opener that declares no background color.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a background color on every slide this opener produces.
    ///
    /// Plain rasters carry no such metadata; operators set it when the
    /// scanner that produced them leaves a known glass color.
    pub fn with_background(mut self, background: Option<Rgb<u8>>) -> Self {
        self.background = background;
        self
    }
}

impl SlideOpener for RasterSlideOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn SlideDecoder>, DecodeError> {
        let open_error = |message: String| DecodeError::Open {
            path: path.to_path_buf(),
            message,
        };

        let reader = ImageReader::open(path)
            .map_err(|e| open_error(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| open_error(e.to_string()))?;

        let format = reader.format().ok_or_else(|| DecodeError::Unsupported {
            reason: format!("unrecognized image data in {}", path.display()),
        })?;

        let image = reader
            .decode()
            .map_err(|e| open_error(e.to_string()))?
            .to_rgba8();

        debug!(
            path = %path.display(),
            format = ?format,
            width = image.width(),
            height = image.height(),
            "Opened raster slide"
        );

        let slide = RasterSlide::from_image(image, format!("{:?}", format), self.background)?;
        Ok(Arc::new(slide))
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// In-memory pyramid built from a single raster image.
pub struct RasterSlide {
    levels: Vec<RgbaImage>,
    downsamples: Vec<f64>,
    format: String,
    background: Option<Rgb<u8>>,
}

impl RasterSlide {
    /// Build the pyramid by repeated halving.
    pub fn from_image(
        image: RgbaImage,
        format: String,
        background: Option<Rgb<u8>>,
    ) -> Result<Self, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::NoLevels);
        }

        let base_width = image.width() as f64;
        let mut levels = vec![image];
        loop {
            let last = &levels[levels.len() - 1];
            if last.width().max(last.height()) <= MIN_LEVEL_EDGE {
                break;
            }
            let width = (last.width() / 2).max(1);
            let height = (last.height() / 2).max(1);
            let next = imageops::resize(last, width, height, FilterType::Triangle);
            levels.push(next);
        }

        let downsamples = levels
            .iter()
            .map(|level| base_width / level.width() as f64)
            .collect();

        Ok(Self {
            levels,
            downsamples,
            format,
            background,
        })
    }
}

impl SlideDecoder for RasterSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        self.levels
            .get(level)
            .map(|img| (img.width() as u64, img.height() as u64))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
    }

    fn properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("openslide.vendor".to_string(), RASTER_VENDOR.to_string());
        props.insert("raster.format".to_string(), self.format.clone());
        props.insert(
            "openslide.level-count".to_string(),
            self.levels.len().to_string(),
        );
        for (level, img) in self.levels.iter().enumerate() {
            props.insert(
                format!("openslide.level[{level}].width"),
                img.width().to_string(),
            );
            props.insert(
                format!("openslide.level[{level}].height"),
                img.height().to_string(),
            );
            props.insert(
                format!("openslide.level[{level}].downsample"),
                self.downsamples[level].to_string(),
            );
        }
        if let Some(Rgb([r, g, b])) = self.background {
            props.insert(
                "openslide.background-color".to_string(),
                format!("{r:02X}{g:02X}{b:02X}"),
            );
        }
        props
    }

    fn background_color(&self) -> Option<Rgb<u8>> {
        self.background
    }

    fn read_region(
        &self,
        x: u64,
        y: u64,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<Vec<u32>, DecodeError> {
        let img = self
            .levels
            .get(level)
            .ok_or(DecodeError::LevelOutOfRange {
                level,
                count: self.levels.len(),
            })?;
        let downsample = self.downsamples[level];

        let origin_x = (x as f64 / downsample) as u64;
        let origin_y = (y as f64 / downsample) as u64;

        let mut buffer = vec![0u32; width as usize * height as usize];
        for row in 0..height as u64 {
            let src_y = origin_y + row;
            if src_y >= img.height() as u64 {
                break;
            }
            for col in 0..width as u64 {
                let src_x = origin_x + col;
                if src_x >= img.width() as u64 {
                    break;
                }
                let pixel = img.get_pixel(src_x as u32, src_y as u32);
                buffer[(row * width as u64 + col) as usize] = premultiply(pixel.0);
            }
        }
        Ok(buffer)
    }
}

/// Pack an RGBA pixel into premultiplied `0xAARRGGBB`.
fn premultiply([r, g, b, a]: [u8; 4]) -> u32 {
    let scale = |c: u8| (c as u32 * a as u32 + 127) / 255;
    (a as u32) << 24 | scale(r) << 16 | scale(g) << 8 | scale(b)
}
