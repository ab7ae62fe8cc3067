//! Single-consumer job queue.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::GenerateError;
use crate::pyramid::{JobSummary, PyramidGenerator};
use crate::slide::SlideOpener;
use crate::storage::StorageFactory;

/// Something that processes one slide file.
#[async_trait]
pub trait SlideJob: Send + Sync + 'static {
    async fn run(&self, path: &Path) -> Result<JobSummary, GenerateError>;
}

#[async_trait]
impl<O, F> SlideJob for PyramidGenerator<O, F>
where
    O: SlideOpener,
    F: StorageFactory,
{
    async fn run(&self, path: &Path) -> Result<JobSummary, GenerateError> {
        self.generate(path).await
    }
}

/// FIFO of slide paths processed one at a time by a background worker.
///
/// A path already queued or in progress is not queued again, so the startup
/// scan and file events can report the same file safely.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<PathBuf>,
    pending: Arc<Mutex<HashSet<PathBuf>>>,
}

impl JobQueue {
    /// Spawn the worker. It runs until every handle to the queue is dropped.
    pub fn start<J: SlideJob>(job: J) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        let worker = tokio::spawn(run_worker(Arc::new(job), rx, Arc::clone(&pending)));
        (Self { tx, pending }, worker)
    }

    /// Queue a slide. Returns `false` if it is already pending or the worker
    /// has stopped. Never blocks.
    pub fn enqueue(&self, path: PathBuf) -> bool {
        {
            let Ok(mut pending) = self.pending.lock() else {
                return false;
            };
            if !pending.insert(path.clone()) {
                return false;
            }
        }

        if self.tx.send(path.clone()).is_err() {
            forget(&self.pending, &path);
            return false;
        }
        true
    }

    /// Paths queued or in progress.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains(path))
            .unwrap_or(false)
    }
}

async fn run_worker<J: SlideJob>(
    job: Arc<J>,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    pending: Arc<Mutex<HashSet<PathBuf>>>,
) {
    while let Some(path) = rx.recv().await {
        let runner = Arc::clone(&job);
        let slide = path.clone();
        // A panicking job surfaces as a JoinError instead of killing the loop.
        let outcome = tokio::spawn(async move { runner.run(&slide).await }).await;

        match outcome {
            Ok(Ok(summary)) => info!(path = %path.display(), %summary, "Job finished"),
            Ok(Err(e)) => error!(path = %path.display(), error = %e, "Job failed"),
            Err(e) => error!(path = %path.display(), error = %e, "Job panicked"),
        }
        forget(&pending, &path);
    }
    warn!("Job queue closed");
}

fn forget(pending: &Mutex<HashSet<PathBuf>>, path: &Path) {
    if let Ok(mut pending) = pending.lock() {
        pending.remove(path);
    }
}
