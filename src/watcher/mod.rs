//! Inbound directory watcher.
//!
//! Watches one directory for new slide files and feeds them, one job at a
//! time, to a [`SlideJob`] through a [`JobQueue`].
//!
//! ```text
//!  startup scan ──┐
//!                 ├──► JobQueue (dedup, FIFO) ──► single worker ──► PyramidGenerator
//!  notify events ─┘
//! ```
//!
//! Files are picked up on creation, and on rename into the directory.
//! Uploaders should write elsewhere and move the finished file in, since a
//! file copied in place is seen as soon as it is created.
//!
//! Dot-files and subdirectories are ignored. Job failures are logged and the
//! watcher keeps going; only losing the event subscription stops it.

mod queue;

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::WatchError;

pub use queue::{JobQueue, SlideJob};

/// Watches a directory and queues every slide that appears in it.
pub struct SlideWatcher {
    dir: PathBuf,
    queue: JobQueue,
}

impl SlideWatcher {
    pub fn new(dir: impl Into<PathBuf>, queue: JobQueue) -> Self {
        Self {
            dir: dir.into(),
            queue,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue every slide already present in the directory.
    ///
    /// The listing runs on the blocking pool. Returns how many files were
    /// newly queued.
    pub async fn scan(&self) -> Result<usize, WatchError> {
        let dir = self.dir.clone();
        let paths = tokio::task::spawn_blocking(move || list_candidates(&dir))
            .await
            .map_err(|e| WatchError::Scan {
                path: self.dir.clone(),
                source: std::io::Error::other(e.to_string()),
            })??;

        let queued = paths
            .into_iter()
            .filter(|path| self.queue.enqueue(path.clone()))
            .count();
        if queued > 0 {
            info!(dir = %self.dir.display(), queued, "Queued existing slides");
        }
        Ok(queued)
    }

    /// Subscribe to the directory, scan it, then queue new files until the
    /// subscription is lost.
    ///
    /// The subscription is taken before the scan so a file arriving in
    /// between is seen at least once; the queue drops the duplicate.
    pub async fn run(self) -> Result<(), WatchError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                if events_tx.send(result).is_err() {
                    error!("Unable to send watcher event to the event loop");
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| self.subscribe_error(e))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| self.subscribe_error(e))?;
        info!(dir = %self.dir.display(), "Watching for slides");

        self.scan().await?;

        while let Some(result) = events_rx.recv().await {
            match result {
                Ok(event) => self.handle_event(event),
                Err(e) if is_fatal(&e) => {
                    error!(dir = %self.dir.display(), error = %e, "Watch subscription lost");
                    return Err(WatchError::Disconnected(e.to_string()));
                }
                Err(e) => {
                    // Events may have been dropped; rescanning catches up.
                    warn!(dir = %self.dir.display(), error = %e, "Watcher error, rescanning");
                    self.scan().await?;
                }
            }
        }

        Err(WatchError::Disconnected("event channel closed".to_string()))
    }

    fn handle_event(&self, event: Event) {
        if !is_arrival(&event.kind) {
            return;
        }
        for path in event.paths {
            if !is_slide_candidate(&path) {
                continue;
            }
            if self.queue.enqueue(path.clone()) {
                info!(path = %path.display(), "Queued new slide");
            } else {
                debug!(path = %path.display(), "Slide already pending");
            }
        }
    }

    fn subscribe_error(&self, e: notify::Error) -> WatchError {
        WatchError::Subscribe {
            path: self.dir.clone(),
            message: e.to_string(),
        }
    }
}

/// Slide candidates in `dir`, sorted by path.
fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>, WatchError> {
    let entries = std::fs::read_dir(dir).map_err(|source| WatchError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_slide_candidate(path))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Whether an event means a file appeared in the directory.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Both))
    )
}

/// Regular, non-hidden files.
pub fn is_slide_candidate(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden && path.is_file()
}

fn is_fatal(e: &notify::Error) -> bool {
    matches!(
        e.kind,
        notify::ErrorKind::PathNotFound
            | notify::ErrorKind::WatchNotFound
            | notify::ErrorKind::MaxFilesWatch
    )
}
