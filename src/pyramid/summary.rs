//! Job accounting.
//!
//! Failed and skipped tiles never fail a job, so the generator counts them
//! instead and reports the counts once per slide.

use std::fmt;

use serde::Serialize;

use crate::tile::TileOutcome;

/// Tile counts for one level or a whole job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileTally {
    /// Tasks handed to the worker pool
    pub submitted: u64,
    /// Tiles encoded and archived
    pub written: u64,
    /// Tiles discarded as background
    pub background: u64,
    /// Tasks clipped to an empty rectangle
    pub empty: u64,
    /// Tiles lost to render, encode or archive errors
    pub failed: u64,
    /// Tasks still pending when the level deadline passed
    pub abandoned: u64,
}

impl TileTally {
    /// Count one finished task.
    pub fn record(&mut self, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Written => self.written += 1,
            TileOutcome::Background => self.background += 1,
            TileOutcome::Empty => self.empty += 1,
            TileOutcome::Failed => self.failed += 1,
        }
    }

    /// Tasks whose outcome is known.
    pub fn finished(&self) -> u64 {
        self.written + self.background + self.empty + self.failed
    }

    fn add(&mut self, other: &TileTally) {
        self.submitted += other.submitted;
        self.written += other.written;
        self.background += other.background;
        self.empty += other.empty;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
    }
}

/// Result of tiling one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub level: usize,
    pub tiles: TileTally,
    /// Whether the deadline cut the level short
    pub timed_out: bool,
    /// Whether the archive was sealed and committed
    pub committed: bool,
}

/// Result of one slide job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub slide_id: String,
    /// Levels in processing order (coarsest first)
    pub levels: Vec<LevelSummary>,
    pub archive_failures: u64,
    pub storage_failures: u64,
    pub thumbnail_committed: bool,
}

impl JobSummary {
    pub fn new(slide_id: impl Into<String>) -> Self {
        Self {
            slide_id: slide_id.into(),
            ..Default::default()
        }
    }

    /// Tile counts over every level.
    pub fn totals(&self) -> TileTally {
        let mut total = TileTally::default();
        for level in &self.levels {
            total.add(&level.tiles);
        }
        total
    }

    /// Levels whose archive reached storage, in commit order.
    pub fn committed_levels(&self) -> Vec<usize> {
        self.levels
            .iter()
            .filter(|l| l.committed)
            .map(|l| l.level)
            .collect()
    }

    /// Summary of one level, if it was processed.
    pub fn level(&self, level: usize) -> Option<&LevelSummary> {
        self.levels.iter().find(|l| l.level == level)
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.totals();
        write!(
            f,
            "slide {}: {}/{} levels committed, {} tiles written, {} background, {} empty, \
             {} failed, {} abandoned, {} archive failures, {} storage failures",
            self.slide_id,
            self.committed_levels().len(),
            self.levels.len(),
            t.written,
            t.background,
            t.empty,
            t.failed,
            t.abandoned,
            self.archive_failures,
            self.storage_failures
        )
    }
}
