//! Durable storage for generated pyramids.
//!
//! Sealed level archives and thumbnails are handed to a [`StorageProvider`],
//! which also publishes the URI templates the serving layer uses to find
//! tiles again.
//!
//! # Backends
//!
//! The backend is chosen by configuration from a closed set:
//!
//! | Backend | Archive commit | Setup |
//! |---------|----------------|-------|
//! | [`LocalStorage`] | entries unpacked under the root directory | root created |
//! | [`S3Storage`] | entries uploaded one object each (client-side extraction) | bucket created, waited for |
//! | [`SwiftStorage`] | archive PUT with `extract-archive` (server-side extraction) | auth, container created and made public |
//!
//! Every backend exposes tiles as individual objects named by
//! [`TILE_NAMING_FORMAT`], so the same template names archive entries and
//! builds public tile URIs.
//!
//! Setup is done by a fallible constructor: a backend that cannot be
//! provisioned returns [`StorageError::Setup`] and the slide job is aborted
//! before any tile is rendered.

mod local;
mod s3;
mod swift;
pub mod template;

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;

pub use local::{LocalConfig, LocalStorage};
pub use s3::{create_s3_client, s3_base_url, S3Config, S3Storage};
pub use swift::{parse_bulk_response, BulkResponse, SwiftConfig, SwiftStorage};
pub use template::{THUMBNAIL_NAMING_FORMAT, TILE_NAMING_FORMAT};

// =============================================================================
// StorageProvider Trait
// =============================================================================

/// Destination for generated artifacts.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Store a single file (thumbnail) under its file name.
    async fn commit_file(&self, file: &Path) -> Result<(), StorageError>;

    /// Store a sealed level archive so its entries become addressable objects.
    async fn commit_archive(&self, file: &Path) -> Result<(), StorageError>;

    /// Public URI template of a tile.
    fn tiles_uri(&self) -> String;

    /// Public URI template of a slide thumbnail.
    fn thumbnail_uri(&self) -> String;

    /// Template used to name archive entries.
    ///
    /// Must match how the backend exposes extracted objects under
    /// [`StorageProvider::tiles_uri`].
    fn tile_naming_format(&self) -> &str {
        TILE_NAMING_FORMAT
    }
}

/// Provisions a storage provider for one slide job.
#[async_trait]
pub trait StorageFactory: Send + Sync + 'static {
    /// The provider this factory produces.
    type Provider: StorageProvider + 'static;

    /// Provision the backend, failing fast if it is unusable.
    async fn connect(&self) -> Result<Self::Provider, StorageError>;
}

// =============================================================================
// Configuration
// =============================================================================

/// Backend selection and its settings.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local(LocalConfig),
    S3(S3Config),
    Swift(SwiftConfig),
}

impl StorageConfig {
    /// Backend name for logs.
    pub fn backend(&self) -> &'static str {
        match self {
            StorageConfig::Local(_) => local::BACKEND,
            StorageConfig::S3(_) => s3::BACKEND,
            StorageConfig::Swift(_) => swift::BACKEND,
        }
    }
}

#[async_trait]
impl StorageFactory for StorageConfig {
    type Provider = Storage;

    async fn connect(&self) -> Result<Storage, StorageError> {
        Storage::connect(self).await
    }
}

// =============================================================================
// Storage
// =============================================================================

/// A provisioned backend, ready to accept commits.
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
    Swift(SwiftStorage),
}

impl Storage {
    /// Provision the configured backend.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        Ok(match config {
            StorageConfig::Local(c) => Storage::Local(LocalStorage::connect(c).await?),
            StorageConfig::S3(c) => Storage::S3(S3Storage::connect(c).await?),
            StorageConfig::Swift(c) => Storage::Swift(SwiftStorage::connect(c).await?),
        })
    }

    fn inner(&self) -> &dyn StorageProvider {
        match self {
            Storage::Local(s) => s,
            Storage::S3(s) => s,
            Storage::Swift(s) => s,
        }
    }
}

#[async_trait]
impl StorageProvider for Storage {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn commit_file(&self, file: &Path) -> Result<(), StorageError> {
        self.inner().commit_file(file).await
    }

    async fn commit_archive(&self, file: &Path) -> Result<(), StorageError> {
        self.inner().commit_archive(file).await
    }

    fn tiles_uri(&self) -> String {
        self.inner().tiles_uri()
    }

    fn thumbnail_uri(&self) -> String {
        self.inner().thumbnail_uri()
    }

    fn tile_naming_format(&self) -> &str {
        self.inner().tile_naming_format()
    }
}

/// Object name of a committed file: its final path component.
pub(crate) fn object_name(file: &Path) -> Result<String, StorageError> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| StorageError::Commit {
            name: file.display().to_string(),
            message: "file has no usable name".to_string(),
        })
}
