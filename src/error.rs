use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or reading a slide through the decoder.
///
/// A decode error on open is fatal to the job: nothing is archived or
/// committed and the source file is left in place for triage.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The slide file could not be opened or parsed
    #[error("Failed to open slide {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// The file format is not understood by the decoder
    #[error("Unsupported slide format: {reason}")]
    Unsupported { reason: String },

    /// The slide reports no pyramid levels
    #[error("Slide has no pyramid levels")]
    NoLevels,

    /// A requested level does not exist
    #[error("Level {level} out of range (slide has {count} levels)")]
    LevelOutOfRange { level: usize, count: usize },

    /// Painting a region failed
    #[error("Failed to read region at level {level}: {message}")]
    Region { level: usize, message: String },
}

/// Errors that can occur while rendering a single tile.
///
/// These never leave the renderer: they are logged with the tile coordinates
/// and counted as failed tiles in the job summary.
#[derive(Debug, Error)]
pub enum TileRenderError {
    /// The decoder could not paint the region
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Lossy encoding of the canvas failed
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },

    /// The archive refused or failed the append
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// The blocking worker running the render died
    #[error("Render worker failed: {message}")]
    Worker { message: String },
}

/// Errors from the per-level tile archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Underlying file I/O failure
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `add_tile` or `save` was called after the archive was sealed
    #[error("Archive {0} is already sealed")]
    Sealed(PathBuf),

    /// A writer lock was poisoned by a panicking task
    #[error("Archive {0} writer is poisoned")]
    Poisoned(PathBuf),

    /// An earlier append failed mid-entry; the stream is no longer trusted
    #[error("Archive {path} is broken: {message}")]
    Broken { path: PathBuf, message: String },

    /// The file name does not map to a known archive format
    #[error("Unknown archive format: {0}")]
    UnknownFormat(PathBuf),
}

/// Errors from storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend provisioning failed (bucket/container creation, auth, ...)
    #[error("{backend} storage setup failed: {message}")]
    Setup {
        backend: &'static str,
        message: String,
    },

    /// Uploading or copying an artifact failed
    #[error("Failed to commit {name}: {message}")]
    Commit { name: String, message: String },

    /// Local file I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Job-level errors returned by the pyramid generator.
///
/// Everything else (tile failures, archive and commit failures) is logged and
/// counted without aborting the job.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The slide could not be opened
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The storage backend could not be provisioned
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Local I/O failure (properties document, source removal, scratch space)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Properties document serialization failure
    #[error("Failed to serialize properties: {0}")]
    Properties(#[from] serde_json::Error),
}

/// Errors that stop the directory watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The filesystem event subscription could not be established
    #[error("Failed to watch {path}: {message}")]
    Subscribe { path: PathBuf, message: String },

    /// The event stream ended or reported a fatal error
    #[error("Filesystem event stream lost: {0}")]
    Disconnected(String),

    /// The startup scan failed
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
