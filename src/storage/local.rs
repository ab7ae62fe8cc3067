//! Local flat-file storage.
//!
//! Archives are unpacked under the root directory so each tile becomes a
//! plain file at `<root>/<entry name>`; the archive itself is not retained.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::archive;
use crate::error::StorageError;

use super::template::{join_uri, THUMBNAIL_NAMING_FORMAT, TILE_NAMING_FORMAT};
use super::{object_name, StorageProvider};

pub(crate) const BACKEND: &str = "local";

/// Settings for [`LocalStorage`].
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Directory receiving tiles and thumbnails
    pub root: PathBuf,

    /// Public base URL of `root`; defaults to its `file://` URL
    pub base_url: Option<String>,
}

/// Copies artifacts into a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create the root directory and resolve the public base URL.
    pub async fn connect(config: &LocalConfig) -> Result<Self, StorageError> {
        let setup = |message: String| StorageError::Setup {
            backend: BACKEND,
            message,
        };

        tokio::fs::create_dir_all(&config.root)
            .await
            .map_err(|e| setup(format!("cannot create {}: {}", config.root.display(), e)))?;
        let root = tokio::fs::canonicalize(&config.root)
            .await
            .map_err(|e| setup(format!("cannot resolve {}: {}", config.root.display(), e)))?;

        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => Url::from_directory_path(&root)
                .map_err(|_| setup(format!("{} has no file URL", root.display())))?
                .as_str()
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self { root, base_url })
    }

    /// Resolved root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn commit_file(&self, file: &Path) -> Result<(), StorageError> {
        let name = object_name(file)?;
        let target = self.root.join(&name);
        tokio::fs::copy(file, &target)
            .await
            .map_err(|e| StorageError::Commit {
                name,
                message: e.to_string(),
            })?;
        debug!(target = %target.display(), "Copied file into local storage");
        Ok(())
    }

    async fn commit_archive(&self, file: &Path) -> Result<(), StorageError> {
        let name = object_name(file)?;
        let archive_path = file.to_path_buf();
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || archive::unpack(&archive_path, &root))
            .await
            .map_err(|e| StorageError::Commit {
                name: name.clone(),
                message: e.to_string(),
            })?
            .map_err(|e| StorageError::Commit {
                name,
                message: e.to_string(),
            })
    }

    fn tiles_uri(&self) -> String {
        join_uri(&self.base_url, TILE_NAMING_FORMAT)
    }

    fn thumbnail_uri(&self) -> String {
        join_uri(&self.base_url, THUMBNAIL_NAMING_FORMAT)
    }
}
