//! End-to-end tests of the pyramid generator against synthetic slides and a
//! recording storage backend.

use image::Rgb;
use std::time::Duration;
use uuid::Uuid;

use wsi_tiler::error::GenerateError;
use wsi_tiler::pyramid::{
    tile_height_key, tile_width_key, PropertiesDocument, PyramidGenerator, PyramidSettings,
    THUMBNAIL_URI_KEY, TILES_URI_KEY,
};
use wsi_tiler::slide::SlideBounds;
use wsi_tiler::ArchiveFormat;

use super::test_utils::{
    argb, Commit, FailingOpener, RecordingStorage, RegionFault, SyntheticOpener, SyntheticSlide,
    Workspace,
};

const SLIDE_UUID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

const TISSUE: Rgb<u8> = Rgb([180, 60, 120]);
const GLASS: Rgb<u8> = Rgb([255, 255, 255]);

fn settings(ws: &Workspace) -> PyramidSettings {
    PyramidSettings::new(ws.work_dir(), ws.properties_dir())
        .with_tile_size(1024)
        .with_workers(4)
}

fn entries_of(commits: &[Commit], archive: &str) -> Vec<String> {
    commits
        .iter()
        .find_map(|c| match c {
            Commit::Archive { name, entries } if name == archive => Some(entries.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("archive {} was not committed", archive))
}

// =============================================================================
// Level Processing
// =============================================================================

#[tokio::test]
async fn test_two_level_pyramid() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(2048, 2048, 1.0), (1024, 1024, 2.0)], TISSUE);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    assert_eq!(summary.slide_id, SLIDE_UUID);

    // Inclusive grid bounds: 3 x 3 submissions at level 0, 2 x 2 at level 1.
    let level0 = summary.level(0).unwrap();
    assert_eq!(level0.tiles.submitted, 9);
    assert_eq!(level0.tiles.written, 4);
    assert_eq!(level0.tiles.empty, 5);
    let level1 = summary.level(1).unwrap();
    assert_eq!(level1.tiles.submitted, 4);
    assert_eq!(level1.tiles.written, 1);

    // Coarsest level first.
    assert_eq!(summary.committed_levels(), vec![1, 0]);
    assert_eq!(
        log.archive_names(),
        vec![
            format!("{}_level1.tar", SLIDE_UUID),
            format!("{}_level0.tar", SLIDE_UUID)
        ]
    );

    let commits = log.commits();
    assert_eq!(
        entries_of(&commits, &format!("{}_level0.tar", SLIDE_UUID)),
        vec![
            format!("{}/0/0_0_1024_1024.jpg", SLIDE_UUID),
            format!("{}/0/0_1024_1024_1024.jpg", SLIDE_UUID),
            format!("{}/0/1024_0_1024_1024.jpg", SLIDE_UUID),
            format!("{}/0/1024_1024_1024_1024.jpg", SLIDE_UUID),
        ]
    );
    assert_eq!(
        entries_of(&commits, &format!("{}_level1.tar", SLIDE_UUID)),
        vec![format!("{}/1/0_0_1024_1024.jpg", SLIDE_UUID)]
    );

    // Thumbnail is committed after every level.
    match commits.last().unwrap() {
        Commit::File { name, size } => {
            assert_eq!(name, &format!("{}_thumbnail.jpg", SLIDE_UUID));
            assert!(*size > 0);
        }
        other => panic!("expected thumbnail commit, got {:?}", other),
    }
    assert!(summary.thumbnail_committed);

    assert!(!source.exists());
    assert!(ws.scratch_files().is_empty());
}

#[tokio::test]
async fn test_partial_edge_tiles_use_clipped_sizes() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.tif", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(1500, 700, 1.0)], TISSUE);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    assert_eq!(summary.totals().submitted, 6);
    assert_eq!(summary.totals().written, 2);
    assert_eq!(
        entries_of(&log.commits(), &format!("{}_level0.tar", SLIDE_UUID)),
        vec![
            format!("{}/0/0_0_1024_700.jpg", SLIDE_UUID),
            format!("{}/0/1024_0_476_700.jpg", SLIDE_UUID),
        ]
    );
}

#[tokio::test]
async fn test_bounds_offset_tile_coordinates() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.mrxs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(4096, 4096, 1.0)], TISSUE).with_bounds(SlideBounds {
        x: 1024,
        y: 1024,
        width: 2048,
        height: 1024,
    });
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    generator.generate(&source).await.unwrap();

    assert_eq!(
        entries_of(&log.commits(), &format!("{}_level0.tar", SLIDE_UUID)),
        vec![
            format!("{}/0/1024_1024_1024_1024.jpg", SLIDE_UUID),
            format!("{}/0/2048_1024_1024_1024.jpg", SLIDE_UUID),
        ]
    );
}

#[tokio::test]
async fn test_gzip_archives() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(512, 512, 1.0)], TISSUE);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(
        SyntheticOpener::new(slide),
        storage,
        settings(&ws).with_archive_format(ArchiveFormat::TarGz),
    );
    generator.generate(&source).await.unwrap();

    assert_eq!(
        entries_of(&log.commits(), &format!("{}_level0.tar.gz", SLIDE_UUID)),
        vec![format!("{}/0/0_0_512_512.jpg", SLIDE_UUID)]
    );
}

// =============================================================================
// Slide Identity
// =============================================================================

#[tokio::test]
async fn test_non_uuid_name_gets_fresh_id() {
    let ws = Workspace::new();
    let source = ws.add_slide("scan001.svs");
    let slide = SyntheticSlide::uniform(&[(256, 256, 1.0)], TISSUE);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    let id = Uuid::parse_str(&summary.slide_id).unwrap();
    assert_eq!(summary.slide_id, id.hyphenated().to_string());
    assert_eq!(
        log.archive_names(),
        vec![format!("{}_level0.tar", summary.slide_id)]
    );
    assert!(PropertiesDocument::path_for(&ws.properties_dir(), &summary.slide_id).exists());
}

// =============================================================================
// Background Filtering
// =============================================================================

#[tokio::test]
async fn test_background_tiles_are_skipped() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let (glass, tissue) = (argb(GLASS), argb(TISSUE));
    let slide = SyntheticSlide::painted(&[(2048, 1024, 1.0)], move |x, _, _| {
        if x < 1024 {
            glass
        } else {
            tissue
        }
    })
    .with_background(GLASS);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    assert_eq!(summary.totals().background, 1);
    assert_eq!(summary.totals().written, 1);
    assert_eq!(
        entries_of(&log.commits(), &format!("{}_level0.tar", SLIDE_UUID)),
        vec![format!("{}/0/1024_0_1024_1024.jpg", SLIDE_UUID)]
    );
}

async fn tile_with_foreground(pixels: u64) -> (u64, u64) {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let (glass, ink) = (argb(GLASS), argb(Rgb([0, 0, 0])));
    let slide = SyntheticSlide::painted(&[(100, 100, 1.0)], move |x, y, _| {
        if y * 100 + x < pixels {
            ink
        } else {
            glass
        }
    })
    .with_background(GLASS);

    let generator = PyramidGenerator::new(
        SyntheticOpener::new(slide),
        RecordingStorage::new(),
        settings(&ws).with_tile_size(100),
    );
    let totals = generator.generate(&source).await.unwrap().totals();
    (totals.written, totals.background)
}

#[tokio::test]
async fn test_background_threshold_is_exclusive() {
    // 100 of 10,000 pixels is exactly 1%: still background.
    assert_eq!(tile_with_foreground(100).await, (0, 1));
    assert_eq!(tile_with_foreground(101).await, (1, 0));
}

// =============================================================================
// Failure Handling
// =============================================================================

async fn run_with_fault(fault: RegionFault) {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide =
        SyntheticSlide::uniform(&[(2048, 1024, 1.0)], TISSUE).with_fault(1024, 0, 0, fault);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    let level0 = summary.level(0).unwrap();
    assert_eq!(level0.tiles.submitted, 6);
    assert_eq!(level0.tiles.written, 1);
    assert_eq!(level0.tiles.empty, 4);
    assert_eq!(level0.tiles.failed, 1);
    assert!(!level0.timed_out);

    // The level still seals and commits, minus the failed tile.
    assert_eq!(summary.committed_levels(), vec![0]);
    assert_eq!(summary.archive_failures, 0);
    assert_eq!(
        entries_of(&log.commits(), &format!("{}_level0.tar", SLIDE_UUID)),
        vec![format!("{}/0/0_0_1024_1024.jpg", SLIDE_UUID)]
    );
    assert!(summary.thumbnail_committed);
    assert!(!source.exists());
}

#[tokio::test]
async fn test_tile_decode_error_drops_only_that_tile() {
    run_with_fault(RegionFault::Error).await;
}

#[tokio::test]
async fn test_tile_worker_panic_drops_only_that_tile() {
    run_with_fault(RegionFault::Panic).await;
}

#[tokio::test]
async fn test_uppercase_uuid_name_is_kept_verbatim() {
    let ws = Workspace::new();
    let upper = SLIDE_UUID.to_uppercase();
    let source = ws.add_slide(&format!("{}.svs", upper));
    let slide = SyntheticSlide::uniform(&[(512, 512, 1.0)], TISSUE);
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    assert_eq!(summary.slide_id, upper);
    assert_eq!(log.archive_names(), vec![format!("{}_level0.tar", upper)]);
    assert!(PropertiesDocument::path_for(&ws.properties_dir(), &upper).exists());
}

#[tokio::test]
async fn test_decode_failure_has_no_side_effects() {
    let ws = Workspace::new();
    let source = ws.add_slide("broken.svs");
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(FailingOpener, storage, settings(&ws));
    let result = generator.generate(&source).await;

    assert!(matches!(result, Err(GenerateError::Decode(_))));
    assert_eq!(log.connections.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(log.commits().is_empty());
    assert!(source.exists());
    assert!(!ws.properties_dir().exists());
    assert!(ws.scratch_files().is_empty());
}

#[tokio::test]
async fn test_storage_setup_failure_aborts_job() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(1024, 1024, 1.0)], TISSUE);
    let opener = SyntheticOpener::new(slide);
    let decoder = opener.slide();
    let storage = RecordingStorage::failing_setup();
    let log = storage.log();

    let generator = PyramidGenerator::new(opener, storage, settings(&ws));
    let result = generator.generate(&source).await;

    assert!(matches!(result, Err(GenerateError::Storage(_))));
    assert!(log.commits().is_empty());
    assert_eq!(decoder.read_count(), 0);
    assert!(source.exists());
}

#[tokio::test]
async fn test_archive_commit_failures_are_counted() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(2048, 2048, 1.0), (1024, 1024, 2.0)], TISSUE);
    let storage = RecordingStorage::failing_archives();
    let log = storage.log();

    let generator = PyramidGenerator::new(SyntheticOpener::new(slide), storage, settings(&ws));
    let summary = generator.generate(&source).await.unwrap();

    assert_eq!(summary.storage_failures, 2);
    assert!(summary.committed_levels().is_empty());
    assert!(summary.thumbnail_committed);
    assert_eq!(log.commits().len(), 1);
    assert!(ws.scratch_files().is_empty());
}

#[tokio::test]
async fn test_level_deadline_seals_partial_archive() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(1024, 1024, 1.0)], TISSUE)
        .with_read_delay(Duration::from_millis(300));
    let storage = RecordingStorage::new();
    let log = storage.log();

    let generator = PyramidGenerator::new(
        SyntheticOpener::new(slide),
        storage,
        settings(&ws)
            .with_tile_size(256)
            .with_workers(1)
            .with_level_timeout(Duration::from_millis(700)),
    );
    let summary = generator.generate(&source).await.unwrap();

    let level = summary.level(0).unwrap();
    assert!(level.timed_out);
    assert!(level.committed);
    assert_eq!(level.tiles.submitted, 25);
    assert!(level.tiles.abandoned > 0);
    assert!(level.tiles.written < 16);

    // Tiles finished after sealing never reach the committed archive.
    let entries = entries_of(&log.commits(), &format!("{}_level0.tar", SLIDE_UUID));
    assert!(entries.len() < 16);
    assert!(entries.len() as u64 >= level.tiles.written);
}

// =============================================================================
// Properties Document
// =============================================================================

#[tokio::test]
async fn test_properties_document() {
    let ws = Workspace::new();
    let source = ws.add_slide(&format!("{}.svs", SLIDE_UUID));
    let slide = SyntheticSlide::uniform(&[(2048, 2048, 1.0), (1024, 1024, 2.0)], TISSUE);

    let generator = PyramidGenerator::new(
        SyntheticOpener::new(slide),
        RecordingStorage::new(),
        settings(&ws),
    );
    generator.generate(&source).await.unwrap();

    let doc = PropertiesDocument::load(&ws.properties_dir(), SLIDE_UUID)
        .await
        .unwrap();
    assert_eq!(doc.get("openslide.vendor"), Some("synthetic"));
    assert_eq!(
        doc.get(TILES_URI_KEY),
        Some("memory://tiles/{id}/{level}/{tileX}_{tileY}_{tileWidth}_{tileHeight}.jpg")
    );
    assert_eq!(
        doc.get(THUMBNAIL_URI_KEY),
        Some("memory://tiles/{id}_thumbnail.jpg")
    );
    for level in 0..2 {
        assert_eq!(doc.get(&tile_width_key(level)), Some("1024"));
        assert_eq!(doc.get(&tile_height_key(level)), Some("1024"));
    }
}
