//! Per-slide pyramid generation.
//!
//! Levels are processed coarsest first. Each level gets its own archive and
//! its own barrier: every tile task of a level is joined (or abandoned at the
//! deadline) before the archive is sealed, so no late task can append to a
//! sealed archive unnoticed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::archive::{Archive, ArchiveFormat};
use crate::error::{DecodeError, GenerateError, TileRenderError};
use crate::slide::{resolve_slide_id, SlideDecoder, SlideDescriptor, SlideOpener};
use crate::storage::template::{expand_id, THUMBNAIL_NAMING_FORMAT};
use crate::storage::{StorageFactory, StorageProvider};
use crate::tile::{JpegTileEncoder, LevelGrid, TileOutcome, TileRenderer, DEFAULT_JPEG_QUALITY};

use super::properties::PropertiesDocument;
use super::summary::{JobSummary, LevelSummary, TileTally};
use super::thumbnail::{render_thumbnail, THUMBNAIL_MAX_EDGE};

/// Default tile edge, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 1024;

/// Default time allowed for all tiles of one level.
pub const DEFAULT_LEVEL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

// =============================================================================
// Settings
// =============================================================================

/// Tunables of a [`PyramidGenerator`].
#[derive(Debug, Clone)]
pub struct PyramidSettings {
    /// Tile edge in pixels
    pub tile_size: u32,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// Tiles rendered concurrently
    pub workers: usize,

    /// Deadline for all tiles of one level
    pub level_timeout: Duration,

    /// Container format of level archives
    pub archive_format: ArchiveFormat,

    /// Scratch directory for archives and thumbnails
    pub work_dir: PathBuf,

    /// Directory receiving properties documents
    pub properties_dir: PathBuf,
}

impl PyramidSettings {
    /// Default settings writing into the given directories.
    pub fn new(work_dir: impl Into<PathBuf>, properties_dir: impl Into<PathBuf>) -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            workers: num_cpus::get(),
            level_timeout: DEFAULT_LEVEL_TIMEOUT,
            archive_format: ArchiveFormat::default(),
            work_dir: work_dir.into(),
            properties_dir: properties_dir.into(),
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_level_timeout(mut self, timeout: Duration) -> Self {
        self.level_timeout = timeout;
        self
    }

    pub fn with_archive_format(mut self, format: ArchiveFormat) -> Self {
        self.archive_format = format;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Turns one slide file into stored tiles, a thumbnail and a properties
/// document.
pub struct PyramidGenerator<O, F> {
    opener: Arc<O>,
    storage: F,
    settings: PyramidSettings,
}

/// Everything a level needs, shared for the lifetime of a job.
struct JobContext<P> {
    slide_id: String,
    decoder: Arc<dyn SlideDecoder>,
    descriptor: SlideDescriptor,
    storage: P,
    pool: Arc<Semaphore>,
    encoder: JpegTileEncoder,
}

impl<O, F> PyramidGenerator<O, F>
where
    O: SlideOpener,
    F: StorageFactory,
{
    pub fn new(opener: O, storage: F, settings: PyramidSettings) -> Self {
        Self {
            opener: Arc::new(opener),
            storage,
            settings,
        }
    }

    pub fn settings(&self) -> &PyramidSettings {
        &self.settings
    }

    /// Process one slide file.
    ///
    /// Returns an error only when the slide cannot be opened, storage cannot
    /// be provisioned or the properties document cannot be written. In the
    /// first two cases nothing has been archived or committed and the source
    /// file is left in place. Tile, archive and commit failures are counted
    /// in the returned summary instead.
    pub async fn generate(&self, path: &Path) -> Result<JobSummary, GenerateError> {
        let slide_id = resolve_slide_id(path);
        info!(slide_id = %slide_id, path = %path.display(), "Processing slide");

        let decoder = self.open(path).await?;
        let descriptor = SlideDescriptor::from_decoder(decoder.as_ref())?;
        let storage = self.storage.connect().await?;
        tokio::fs::create_dir_all(&self.settings.work_dir).await?;

        debug!(
            slide_id = %slide_id,
            levels = descriptor.level_count(),
            width = descriptor.dimensions().0,
            height = descriptor.dimensions().1,
            storage = storage.name(),
            "Slide opened"
        );

        let ctx = JobContext {
            slide_id: slide_id.clone(),
            decoder,
            descriptor,
            storage,
            pool: Arc::new(Semaphore::new(self.settings.workers.max(1))),
            encoder: JpegTileEncoder::new(self.settings.jpeg_quality),
        };

        let mut summary = JobSummary::new(&slide_id);
        for level in (0..ctx.descriptor.level_count()).rev() {
            let level_summary = self.generate_level(&ctx, level, &mut summary).await;
            summary.levels.push(level_summary);
        }

        summary.thumbnail_committed = self.commit_thumbnail(&ctx, &mut summary).await;

        let document = PropertiesDocument::build(
            ctx.decoder.properties(),
            &ctx.storage.tiles_uri(),
            &ctx.storage.thumbnail_uri(),
            ctx.descriptor.level_count(),
            self.settings.tile_size,
        );
        let properties_path = document
            .persist(&self.settings.properties_dir, &slide_id)
            .await?;
        debug!(path = %properties_path.display(), "Wrote properties document");

        tokio::fs::remove_file(path).await?;

        info!(%summary, "Slide complete");
        Ok(summary)
    }

    async fn open(&self, path: &Path) -> Result<Arc<dyn SlideDecoder>, DecodeError> {
        let opener = Arc::clone(&self.opener);
        let slide_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || opener.open(&slide_path))
            .await
            .map_err(|e| DecodeError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
    }

    /// Render, seal and commit one level.
    async fn generate_level<P>(
        &self,
        ctx: &JobContext<P>,
        level: usize,
        summary: &mut JobSummary,
    ) -> LevelSummary
    where
        P: StorageProvider + 'static,
    {
        let mut result = LevelSummary {
            level,
            ..Default::default()
        };

        let Some(grid) = LevelGrid::new(&ctx.descriptor, level, self.settings.tile_size) else {
            warn!(slide_id = %ctx.slide_id, level, "Level has no geometry, skipping");
            return result;
        };

        let format = self.settings.archive_format;
        let archive_path = self.settings.work_dir.join(format!(
            "{}_level{}.{}",
            ctx.slide_id,
            level,
            format.extension()
        ));
        let created = {
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || Archive::create(archive_path, format)).await
        };
        let archive = match created
            .map_err(|e| e.to_string())
            .and_then(|created| created.map_err(|e| e.to_string()))
        {
            Ok(archive) => Arc::new(archive),
            Err(e) => {
                error!(slide_id = %ctx.slide_id, level, error = %e, "Cannot create level archive");
                summary.archive_failures += 1;
                return result;
            }
        };

        let renderer = Arc::new(TileRenderer::new(
            ctx.slide_id.clone(),
            Arc::clone(&ctx.decoder),
            Arc::clone(&archive),
            ctx.encoder,
            ctx.storage.tile_naming_format(),
            ctx.descriptor.background,
        ));

        debug!(
            slide_id = %ctx.slide_id,
            level,
            rows = grid.rows(),
            cols = grid.cols(),
            downsample = grid.downsample(),
            "Submitting level"
        );

        let mut tasks = JoinSet::new();
        for job in grid.jobs() {
            result.tiles.submitted += 1;
            let renderer = Arc::clone(&renderer);
            let pool = Arc::clone(&ctx.pool);
            tasks.spawn(async move {
                let Ok(permit) = pool.acquire_owned().await else {
                    return TileOutcome::Failed;
                };
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    renderer.render(&job)
                })
                .await
                .unwrap_or_else(|e| {
                    let e = TileRenderError::Worker {
                        message: e.to_string(),
                    };
                    warn!(level = job.level, x = job.x, y = job.y, error = %e, "Tile dropped");
                    TileOutcome::Failed
                })
            });
        }

        result.timed_out =
            !join_level(&mut tasks, self.settings.level_timeout, &mut result.tiles).await;
        if result.timed_out {
            warn!(
                slide_id = %ctx.slide_id,
                level,
                abandoned = result.tiles.abandoned,
                timeout_secs = self.settings.level_timeout.as_secs(),
                "Level deadline passed, sealing with the tiles written so far"
            );
        }

        // Stragglers still holding the renderer see a sealed archive and fail.
        drop(renderer);
        let sealing = Arc::clone(&archive);
        let sealed = tokio::task::spawn_blocking(move || sealing.save()).await;
        match sealed {
            Ok(Ok(path)) => {
                match ctx.storage.commit_archive(&path).await {
                    Ok(()) => {
                        result.committed = true;
                        info!(
                            slide_id = %ctx.slide_id,
                            level,
                            tiles = archive.entry_count(),
                            "Committed level archive"
                        );
                    }
                    Err(e) => {
                        error!(slide_id = %ctx.slide_id, level, error = %e, "Level archive commit failed");
                        summary.storage_failures += 1;
                    }
                }
            }
            Ok(Err(e)) => {
                error!(slide_id = %ctx.slide_id, level, error = %e, "Cannot seal level archive");
                summary.archive_failures += 1;
            }
            Err(e) => {
                error!(slide_id = %ctx.slide_id, level, error = %e, "Archive sealing task died");
                summary.archive_failures += 1;
            }
        }

        remove_scratch(&archive_path).await;
        result
    }

    /// Render, commit and discard the thumbnail. Returns whether it reached
    /// storage.
    async fn commit_thumbnail<P>(&self, ctx: &JobContext<P>, summary: &mut JobSummary) -> bool
    where
        P: StorageProvider + 'static,
    {
        let decoder = Arc::clone(&ctx.decoder);
        let descriptor = ctx.descriptor.clone();
        let encoder = ctx.encoder;
        let rendered = tokio::task::spawn_blocking(move || {
            let canvas = render_thumbnail(decoder.as_ref(), &descriptor, THUMBNAIL_MAX_EDGE)
                .map_err(|e| e.to_string())?;
            encoder.encode(&canvas).map_err(|e| e.to_string())
        })
        .await;

        let jpeg = match rendered {
            Ok(Ok(jpeg)) => jpeg,
            Ok(Err(message)) => {
                error!(slide_id = %ctx.slide_id, error = %message, "Thumbnail render failed");
                return false;
            }
            Err(e) => {
                error!(slide_id = %ctx.slide_id, error = %e, "Thumbnail task died");
                return false;
            }
        };

        let path = self
            .settings
            .work_dir
            .join(expand_id(THUMBNAIL_NAMING_FORMAT, &ctx.slide_id));
        if let Err(e) = tokio::fs::write(&path, &jpeg).await {
            error!(slide_id = %ctx.slide_id, error = %e, "Cannot write thumbnail");
            return false;
        }

        let committed = match ctx.storage.commit_file(&path).await {
            Ok(()) => true,
            Err(e) => {
                error!(slide_id = %ctx.slide_id, error = %e, "Thumbnail commit failed");
                summary.storage_failures += 1;
                false
            }
        };

        remove_scratch(&path).await;
        committed
    }
}

/// Join every task of a level, giving up at `deadline`.
///
/// Returns `false` if the deadline passed. Unfinished tasks are then aborted
/// and counted as abandoned. Renders already running on the blocking pool
/// cannot be interrupted; they finish on their own and find the archive
/// sealed.
async fn join_level(
    tasks: &mut JoinSet<TileOutcome>,
    deadline: Duration,
    tally: &mut TileTally,
) -> bool {
    let drained = tokio::time::timeout(deadline, async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => tally.record(outcome),
                Err(_) => tally.failed += 1,
            }
        }
    })
    .await;

    if drained.is_ok() {
        return true;
    }

    tasks.abort_all();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => tally.record(outcome),
            Err(e) if e.is_cancelled() => tally.abandoned += 1,
            Err(_) => tally.failed += 1,
        }
    }
    false
}

async fn remove_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove scratch file"),
    }
}
