//! Per-level tile archives.
//!
//! Every pyramid level of a slide is packed into one tar container while its
//! tiles render. Renderer tasks append concurrently; the archive serializes
//! them behind a mutex so each entry is written as one unit. Once sealed the
//! archive rejects any further write, which is what keeps late renderer tasks
//! from corrupting a stream that is already being committed.
//!
//! # Formats
//!
//! - [`ArchiveFormat::Tar`]: plain tar, fastest to produce
//! - [`ArchiveFormat::TarGz`]: gzip-compressed tar, smaller uploads
//!
//! Both are understood by Swift bulk extraction and by the client-side
//! extraction used for local and S3 storage.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::ArchiveError;

// =============================================================================
// Archive Format
// =============================================================================

/// Container format for level archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ArchiveFormat {
    /// Uncompressed tar
    #[default]
    Tar,

    /// Gzip-compressed tar
    TarGz,
}

impl ArchiveFormat {
    /// File extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    /// Infer the format from an archive file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

// =============================================================================
// Archive
// =============================================================================

enum ArchiveWriter {
    Plain(tar::Builder<BufWriter<File>>),
    Gzip(tar::Builder<GzEncoder<BufWriter<File>>>),
}

impl ArchiveWriter {
    fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );

        match self {
            ArchiveWriter::Plain(builder) => builder.append_data(&mut header, name, data),
            ArchiveWriter::Gzip(builder) => builder.append_data(&mut header, name, data),
        }
    }

    fn finish(self) -> io::Result<()> {
        let file = match self {
            ArchiveWriter::Plain(builder) => builder.into_inner()?.into_inner()?,
            ArchiveWriter::Gzip(builder) => builder.into_inner()?.finish()?.into_inner()?,
        };
        file.sync_all()
    }
}

enum State {
    Open(ArchiveWriter),
    Sealed,
    Broken(String),
}

/// Append-only container holding the tiles of one pyramid level.
///
/// Lifecycle: [`Archive::create`] opens the file, [`Archive::add_tile`] may be
/// called from any number of threads, [`Archive::save`] seals it and returns
/// the finished file. After sealing every mutation fails with
/// [`ArchiveError::Sealed`].
///
/// If an append fails partway the archive turns broken: later appends and
/// `save` fail, so a half-written stream is never handed to storage.
pub struct Archive {
    path: PathBuf,
    format: ArchiveFormat,
    state: Mutex<State>,
    entries: AtomicUsize,
}

impl Archive {
    /// Create a new, empty archive at `path`.
    pub fn create(path: impl Into<PathBuf>, format: ArchiveFormat) -> Result<Self, ArchiveError> {
        let path = path.into();
        let file = BufWriter::new(File::create(&path)?);

        let writer = match format {
            ArchiveFormat::Tar => ArchiveWriter::Plain(tar::Builder::new(file)),
            ArchiveFormat::TarGz => ArchiveWriter::Gzip(tar::Builder::new(GzEncoder::new(
                file,
                Compression::fast(),
            ))),
        };

        debug!(path = %path.display(), ?format, "Created archive");

        Ok(Self {
            path,
            format,
            state: Mutex::new(State::Open(writer)),
            entries: AtomicUsize::new(0),
        })
    }

    /// Append one tile under `name`.
    ///
    /// Safe to call concurrently; writers are serialized internally.
    pub fn add_tile(&self, name: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ArchiveError::Poisoned(self.path.clone()))?;

        let writer = match &mut *state {
            State::Open(writer) => writer,
            State::Sealed => return Err(ArchiveError::Sealed(self.path.clone())),
            State::Broken(message) => {
                return Err(ArchiveError::Broken {
                    path: self.path.clone(),
                    message: message.clone(),
                })
            }
        };

        if let Err(e) = writer.append(name, data) {
            *state = State::Broken(e.to_string());
            return Err(ArchiveError::Io(e));
        }

        self.entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Seal the archive and return the path of the finished file.
    pub fn save(&self) -> Result<PathBuf, ArchiveError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ArchiveError::Poisoned(self.path.clone()))?;

        match std::mem::replace(&mut *state, State::Sealed) {
            State::Open(writer) => {
                writer.finish()?;
                debug!(
                    path = %self.path.display(),
                    entries = self.entry_count(),
                    "Sealed archive"
                );
                Ok(self.path.clone())
            }
            State::Sealed => Err(ArchiveError::Sealed(self.path.clone())),
            State::Broken(message) => {
                *state = State::Broken(message.clone());
                Err(ArchiveError::Broken {
                    path: self.path.clone(),
                    message,
                })
            }
        }
    }

    /// Whether `save` has completed.
    pub fn is_sealed(&self) -> bool {
        matches!(self.state.lock().as_deref(), Ok(State::Sealed))
    }

    /// Number of tiles appended so far.
    pub fn entry_count(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// Location of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container format of this archive.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }
}

// =============================================================================
// Reading
// =============================================================================

fn open_reader(path: &Path) -> Result<tar::Archive<Box<dyn Read>>, ArchiveError> {
    let format =
        ArchiveFormat::from_path(path).ok_or_else(|| ArchiveError::UnknownFormat(path.into()))?;
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::Tar => Box::new(file),
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
    };
    Ok(tar::Archive::new(reader))
}

/// Visit every regular file in a sealed archive, in stream order.
///
/// The format is inferred from the file name. Returns the number of entries
/// visited; stops at the first error returned by `visit`.
pub fn for_each_entry<F>(path: &Path, mut visit: F) -> Result<usize, ArchiveError>
where
    F: FnMut(String, Vec<u8>) -> io::Result<()>,
{
    let mut archive = open_reader(path)?;
    let mut count = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        visit(name, data)?;
        count += 1;
    }

    Ok(count)
}

/// Extract a sealed archive under `dest`, creating directories as needed.
pub fn unpack(path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = open_reader(path)?;
    archive.unpack(dest)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
