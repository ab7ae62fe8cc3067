//! Tile grid geometry for one pyramid level.

use crate::slide::SlideDescriptor;

/// One unit of tiling work: a clipped rectangle of a level.
///
/// `x` and `y` are absolute level-0 coordinates (bounds offset included),
/// `width` and `height` are in pixels of the level and shrink at the slide
/// edges. Rows advance along the X axis and columns along the Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileJob {
    pub level: usize,
    pub row: u64,
    pub col: u64,
    pub x: u64,
    pub y: u64,
    pub width: u32,
    pub height: u32,
}

impl TileJob {
    /// A tile clipped away entirely by the slide edge.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels in the tile.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Tile layout of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGrid {
    level: usize,
    width: u64,
    height: u64,
    tile_size: u32,
    downsample: u64,
    offset: (u64, u64),
    rows: u64,
    cols: u64,
}

impl LevelGrid {
    /// Lay out `level` of a slide with square tiles of `tile_size` pixels.
    ///
    /// Returns `None` for an unknown level or a zero tile size.
    pub fn new(descriptor: &SlideDescriptor, level: usize, tile_size: u32) -> Option<Self> {
        if tile_size == 0 {
            return None;
        }
        let (width, height) = descriptor.bounded_level_size(level)?;
        let downsample = descriptor.integer_downsample(level)?;
        let tile = tile_size as u64;

        Some(Self {
            level,
            width,
            height,
            tile_size,
            downsample,
            offset: descriptor.offset(),
            rows: width.div_ceil(tile),
            cols: height.div_ceil(tile),
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Level size after applying the bounds multiplier.
    pub fn dimensions(&self) -> (u64, u64) {
        (self.width, self.height)
    }

    /// Tiles needed along X.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Tiles needed along Y.
    pub fn cols(&self) -> u64 {
        self.cols
    }

    pub fn downsample(&self) -> u64 {
        self.downsample
    }

    /// Number of jobs [`LevelGrid::jobs`] yields.
    pub fn submission_count(&self) -> u64 {
        (self.rows + 1) * (self.cols + 1)
    }

    /// Every job of the level.
    ///
    /// Iterates one row and one column past the exact tile count to absorb
    /// rounding in the level size; the extra jobs clip to empty rectangles
    /// whenever the size divides evenly.
    pub fn jobs(&self) -> impl Iterator<Item = TileJob> + '_ {
        (0..=self.rows).flat_map(move |row| (0..=self.cols).map(move |col| self.job(row, col)))
    }

    /// The job at grid position `(row, col)`.
    pub fn job(&self, row: u64, col: u64) -> TileJob {
        let tile = self.tile_size as u64;
        let level_x = row * tile;
        let level_y = col * tile;

        let width = self.width.saturating_sub(level_x).min(tile) as u32;
        let height = self.height.saturating_sub(level_y).min(tile) as u32;

        TileJob {
            level: self.level,
            row,
            col,
            x: level_x * self.downsample + self.offset.0,
            y: level_y * self.downsample + self.offset.1,
            width,
            height,
        }
    }
}
