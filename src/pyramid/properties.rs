//! Slide properties document.
//!
//! The only long-lived local artifact of a job besides the thumbnail. It
//! holds the decoder's raw properties plus the URI templates and tile-size
//! overrides the serving layer needs, stored as `<dir>/<slide id>.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// Key holding the tile URI template.
pub const TILES_URI_KEY: &str = "remoteserver-uri";

/// Key holding the thumbnail URI template.
pub const THUMBNAIL_URI_KEY: &str = "thumbnail-uri";

/// Properties of one generated slide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertiesDocument {
    properties: BTreeMap<String, String>,
}

impl PropertiesDocument {
    /// Build the document from raw decoder properties.
    ///
    /// Synthesized keys override raw keys of the same name. Tile size
    /// overrides are written for every level so viewers request tiles with
    /// the pyramid's edge size rather than the scanner's native one.
    pub fn build(
        raw: BTreeMap<String, String>,
        tiles_uri: &str,
        thumbnail_uri: &str,
        level_count: usize,
        tile_size: u32,
    ) -> Self {
        let mut properties = raw;
        properties.insert(TILES_URI_KEY.to_string(), tiles_uri.to_string());
        properties.insert(THUMBNAIL_URI_KEY.to_string(), thumbnail_uri.to_string());
        for level in 0..level_count {
            properties.insert(tile_width_key(level), tile_size.to_string());
            properties.insert(tile_height_key(level), tile_size.to_string());
        }
        Self { properties }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Location of a slide's document under `dir`.
    pub fn path_for(dir: &Path, slide_id: &str) -> PathBuf {
        dir.join(format!("{slide_id}.json"))
    }

    /// Write the document, creating `dir` if needed.
    pub async fn persist(&self, dir: &Path, slide_id: &str) -> Result<PathBuf, GenerateError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = Self::path_for(dir, slide_id);
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Read a persisted document.
    pub async fn load(dir: &Path, slide_id: &str) -> Result<Self, GenerateError> {
        let data = tokio::fs::read(Self::path_for(dir, slide_id)).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// Tile width override key of a level.
pub fn tile_width_key(level: usize) -> String {
    format!("openslide.level[{level}].tile-width")
}

/// Tile height override key of a level.
pub fn tile_height_key(level: usize) -> String {
    format!("openslide.level[{level}].tile-height")
}
