//! End-to-end tests against the local storage backend.

use image::{Rgba, RgbaImage};
use std::path::Path;

use wsi_tiler::pyramid::{PropertiesDocument, PyramidGenerator, PyramidSettings, TILES_URI_KEY};
use wsi_tiler::storage::{LocalConfig, Storage, StorageConfig, StorageProvider};
use wsi_tiler::RasterSlideOpener;

use super::test_utils::Workspace;

const SLIDE_UUID: &str = "5e2c7a10-3b4d-4f6e-8a9b-c0d1e2f3a4b5";

fn write_gradient_png(path: &Path, width: u32, height: u32) {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    });
    image.save(path).unwrap();
}

fn local_config(root: &Path) -> StorageConfig {
    StorageConfig::Local(LocalConfig {
        root: root.to_path_buf(),
        base_url: Some("https://tiles.example.org/".to_string()),
    })
}

#[tokio::test]
async fn test_raster_slide_to_local_storage() {
    let ws = Workspace::new();
    let source = ws.inbox().join(format!("{}.png", SLIDE_UUID));
    write_gradient_png(&source, 1200, 800);
    let root = ws.root.path().join("pyramids");

    let generator = PyramidGenerator::new(
        RasterSlideOpener::new(),
        local_config(&root),
        PyramidSettings::new(ws.work_dir(), ws.properties_dir()).with_workers(2),
    );
    let summary = generator.generate(&source).await.unwrap();

    // 1200x800 halves to 600x400 and 300x200.
    assert_eq!(summary.levels.len(), 3);
    assert_eq!(summary.committed_levels(), vec![2, 1, 0]);

    let slide_dir = root.join(SLIDE_UUID);
    for tile in [
        "0/0_0_1024_800.jpg",
        "0/1024_0_176_800.jpg",
        "1/0_0_600_400.jpg",
        "2/0_0_300_200.jpg",
    ] {
        let path = slide_dir.join(tile);
        let data = std::fs::read(&path).unwrap_or_else(|_| panic!("missing {}", path.display()));
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
    }

    let thumbnail = image::open(root.join(format!("{}_thumbnail.jpg", SLIDE_UUID))).unwrap();
    assert_eq!((thumbnail.width(), thumbnail.height()), (500, 333));

    let doc = PropertiesDocument::load(&ws.properties_dir(), SLIDE_UUID)
        .await
        .unwrap();
    assert_eq!(
        doc.get(TILES_URI_KEY),
        Some("https://tiles.example.org/{id}/{level}/{tileX}_{tileY}_{tileWidth}_{tileHeight}.jpg")
    );
    assert_eq!(doc.get("openslide.vendor"), Some("generic-raster"));

    assert!(!source.exists());
    assert!(ws.scratch_files().is_empty());
}

#[tokio::test]
async fn test_unreadable_raster_is_left_in_place() {
    let ws = Workspace::new();
    let source = ws.add_slide("notes.txt");
    let root = ws.root.path().join("pyramids");

    let generator = PyramidGenerator::new(
        RasterSlideOpener::new(),
        local_config(&root),
        PyramidSettings::new(ws.work_dir(), ws.properties_dir()),
    );

    assert!(generator.generate(&source).await.is_err());
    assert!(source.exists());
    assert!(!root.exists());
}

#[tokio::test]
async fn test_local_storage_uri_templates() {
    let ws = Workspace::new();
    let storage = Storage::connect(&local_config(&ws.root.path().join("out")))
        .await
        .unwrap();

    assert_eq!(storage.name(), "local");
    assert_eq!(
        storage.thumbnail_uri(),
        "https://tiles.example.org/{id}_thumbnail.jpg"
    );
}
