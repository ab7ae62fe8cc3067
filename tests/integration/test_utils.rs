//! Test utilities for integration tests.
//!
//! This module provides a synthetic slide decoder, openers with scripted
//! behavior and a storage backend that records every commit.

use async_trait::async_trait;
use image::Rgb;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wsi_tiler::archive;
use wsi_tiler::error::{DecodeError, StorageError};
use wsi_tiler::slide::{SlideBounds, SlideDecoder, SlideOpener};
use wsi_tiler::storage::{StorageFactory, StorageProvider};

/// Opaque ARGB of an RGB color.
pub fn argb(color: Rgb<u8>) -> u32 {
    0xFF00_0000 | (color[0] as u32) << 16 | (color[1] as u32) << 8 | color[2] as u32
}

// =============================================================================
// Synthetic Slide
// =============================================================================

/// Paints a pixel given its level-space coordinates and level.
pub type Painter = dyn Fn(u64, u64, usize) -> u32 + Send + Sync;

/// How a scripted region read misbehaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionFault {
    /// Return a decode error
    Error,
    /// Panic inside the decoder
    Panic,
}

/// An in-memory slide with scripted geometry and content.
pub struct SyntheticSlide {
    levels: Vec<(u64, u64, f64)>,
    bounds: Option<SlideBounds>,
    background: Option<Rgb<u8>>,
    properties: BTreeMap<String, String>,
    painter: Box<Painter>,
    read_delay: Option<Duration>,
    faults: Vec<((u64, u64, usize), RegionFault)>,
    reads: AtomicUsize,
}

impl SyntheticSlide {
    /// A slide with the given `(width, height, downsample)` levels painted
    /// uniformly with `color`.
    pub fn uniform(levels: &[(u64, u64, f64)], color: Rgb<u8>) -> Self {
        let pixel = argb(color);
        Self::painted(levels, move |_, _, _| pixel)
    }

    pub fn painted<P>(levels: &[(u64, u64, f64)], painter: P) -> Self
    where
        P: Fn(u64, u64, usize) -> u32 + Send + Sync + 'static,
    {
        let mut properties = BTreeMap::new();
        properties.insert("openslide.vendor".to_string(), "synthetic".to_string());
        properties.insert(
            "openslide.level-count".to_string(),
            levels.len().to_string(),
        );
        Self {
            levels: levels.to_vec(),
            bounds: None,
            background: None,
            properties,
            painter: Box::new(painter),
            read_delay: None,
            faults: Vec::new(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_background(mut self, color: Rgb<u8>) -> Self {
        self.background = Some(color);
        self
    }

    pub fn with_bounds(mut self, bounds: SlideBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Make every region read take at least `delay`.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Make the read of the region at level-0 `(x, y)` on `level` fail.
    pub fn with_fault(mut self, x: u64, y: u64, level: usize, fault: RegionFault) -> Self {
        self.faults.push(((x, y, level), fault));
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl SyntheticSlide {
    fn fault_at(&self, x: u64, y: u64, level: usize) -> Option<RegionFault> {
        self.faults
            .iter()
            .find(|(at, _)| *at == (x, y, level))
            .map(|&(_, fault)| fault)
    }
}

impl SlideDecoder for SyntheticSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        self.levels.get(level).map(|&(w, h, _)| (w, h))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|&(_, _, d)| d)
    }

    fn properties(&self) -> BTreeMap<String, String> {
        self.properties.clone()
    }

    fn bounds(&self) -> Option<SlideBounds> {
        self.bounds
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
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        match self.fault_at(x, y, level) {
            Some(RegionFault::Error) => {
                return Err(DecodeError::Region {
                    level,
                    message: format!("corrupt region at {x},{y}"),
                })
            }
            Some(RegionFault::Panic) => panic!("decoder crashed at {x},{y}"),
            None => {}
        }

        let &(level_width, level_height, downsample) =
            self.levels
                .get(level)
                .ok_or(DecodeError::LevelOutOfRange {
                    level,
                    count: self.levels.len(),
                })?;
        let origin_x = (x as f64 / downsample) as u64;
        let origin_y = (y as f64 / downsample) as u64;

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for dy in 0..height as u64 {
            for dx in 0..width as u64 {
                let (px, py) = (origin_x + dx, origin_y + dy);
                if px < level_width && py < level_height {
                    pixels.push((self.painter)(px, py, level));
                } else {
                    pixels.push(0);
                }
            }
        }
        Ok(pixels)
    }
}

// =============================================================================
// Openers
// =============================================================================

/// Hands out the same synthetic slide for every path.
pub struct SyntheticOpener {
    slide: Arc<SyntheticSlide>,
}

impl SyntheticOpener {
    pub fn new(slide: SyntheticSlide) -> Self {
        Self {
            slide: Arc::new(slide),
        }
    }

    pub fn slide(&self) -> Arc<SyntheticSlide> {
        Arc::clone(&self.slide)
    }
}

impl SlideOpener for SyntheticOpener {
    fn open(&self, _path: &Path) -> Result<Arc<dyn SlideDecoder>, DecodeError> {
        Ok(self.slide.clone() as Arc<dyn SlideDecoder>)
    }
}

/// Rejects every file as unreadable.
pub struct FailingOpener;

impl SlideOpener for FailingOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn SlideDecoder>, DecodeError> {
        Err(DecodeError::Open {
            path: path.to_path_buf(),
            message: "not a slide".to_string(),
        })
    }
}

// =============================================================================
// Recording Storage
// =============================================================================

/// One commit seen by [`RecordingStorage`].
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    /// A level archive and the names of its entries
    Archive { name: String, entries: Vec<String> },
    /// A single file
    File { name: String, size: u64 },
}

impl Commit {
    pub fn name(&self) -> &str {
        match self {
            Commit::Archive { name, .. } | Commit::File { name, .. } => name,
        }
    }
}

/// Shared log of commits and connections.
#[derive(Default)]
pub struct StorageLog {
    pub commits: Mutex<Vec<Commit>>,
    pub connections: AtomicUsize,
}

impl StorageLog {
    pub fn commits(&self) -> Vec<Commit> {
        self.commits.lock().unwrap().clone()
    }

    pub fn archive_names(&self) -> Vec<String> {
        self.commits()
            .into_iter()
            .filter(|c| matches!(c, Commit::Archive { .. }))
            .map(|c| c.name().to_string())
            .collect()
    }
}

/// Storage factory recording every commit instead of storing anything.
#[derive(Clone)]
pub struct RecordingStorage {
    log: Arc<StorageLog>,
    fail_setup: bool,
    fail_archives: bool,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self {
            log: Arc::new(StorageLog::default()),
            fail_setup: false,
            fail_archives: false,
        }
    }

    /// Refuse to provision.
    pub fn failing_setup() -> Self {
        Self {
            fail_setup: true,
            ..Self::new()
        }
    }

    /// Provision, but reject every archive commit.
    pub fn failing_archives() -> Self {
        Self {
            fail_archives: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> Arc<StorageLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl StorageFactory for RecordingStorage {
    type Provider = RecordingProvider;

    async fn connect(&self) -> Result<RecordingProvider, StorageError> {
        self.log.connections.fetch_add(1, Ordering::SeqCst);
        if self.fail_setup {
            return Err(StorageError::Setup {
                backend: "recording",
                message: "bucket creation refused".to_string(),
            });
        }
        Ok(RecordingProvider {
            log: Arc::clone(&self.log),
            fail_archives: self.fail_archives,
        })
    }
}

pub struct RecordingProvider {
    log: Arc<StorageLog>,
    fail_archives: bool,
}

#[async_trait]
impl StorageProvider for RecordingProvider {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn commit_file(&self, file: &Path) -> Result<(), StorageError> {
        let size = tokio::fs::metadata(file).await?.len();
        self.log.commits.lock().unwrap().push(Commit::File {
            name: file_name(file),
            size,
        });
        Ok(())
    }

    async fn commit_archive(&self, file: &Path) -> Result<(), StorageError> {
        if self.fail_archives {
            return Err(StorageError::Commit {
                name: file_name(file),
                message: "service unavailable".to_string(),
            });
        }

        let mut entries = Vec::new();
        archive::for_each_entry(file, |name, _data| {
            entries.push(name);
            Ok(())
        })
        .map_err(|e| StorageError::Commit {
            name: file_name(file),
            message: e.to_string(),
        })?;
        entries.sort();

        self.log.commits.lock().unwrap().push(Commit::Archive {
            name: file_name(file),
            entries,
        });
        Ok(())
    }

    fn tiles_uri(&self) -> String {
        "memory://tiles/{id}/{level}/{tileX}_{tileY}_{tileWidth}_{tileHeight}.jpg".to_string()
    }

    fn thumbnail_uri(&self) -> String {
        "memory://tiles/{id}_thumbnail.jpg".to_string()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// =============================================================================
// Workspace
// =============================================================================

/// Scratch layout for one test: inbox, work and properties directories.
pub struct Workspace {
    pub root: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("inbox")).unwrap();
        Self { root }
    }

    pub fn inbox(&self) -> PathBuf {
        self.root.path().join("inbox")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn properties_dir(&self) -> PathBuf {
        self.root.path().join("properties")
    }

    /// Drop a placeholder slide file into the inbox.
    pub fn add_slide(&self, name: &str) -> PathBuf {
        let path = self.inbox().join(name);
        std::fs::write(&path, b"synthetic slide").unwrap();
        path
    }

    /// Files left in the work directory.
    pub fn scratch_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.work_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }
}
