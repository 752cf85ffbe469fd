// Asynchronous offsite copies of finished clips
//
// Every finished clip gets its own worker thread that copies the file into the
// remote directory. Workers never retry; a failure becomes text on the task and
// is logged once when the task is reaped.
//
// Reaping is strictly in submission order: only the head of the queue is
// inspected, and a head that is still copying stops the pass even when tasks
// behind it have already finished.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::storage;

/// Performs one copy and describes the failure, if any
pub type CopyFn = Arc<dyn Fn(&Path, &Path) -> Option<String> + Send + Sync>;

/// State a worker publishes to the reaper.
///
/// The worker writes `error` first and sets `done` last (release store);
/// the reaper reads `done` (acquire load) before touching `error`.
#[derive(Default)]
struct CopyState {
    done: AtomicBool,
    error: Mutex<Option<String>>,
}

/// One in-flight or finished copy
pub struct CopyTask {
    source: PathBuf,
    destination: PathBuf,
    state: Arc<CopyState>,
    handle: Option<JoinHandle<()>>,
}

impl CopyTask {
    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    fn status(&self) -> CopyStatus {
        let done = self.is_done();
        CopyStatus {
            destination: self.destination.clone(),
            done,
            error: if done { self.state.error.lock().clone() } else { None },
        }
    }

    /// Join the worker and collect its result. Only call once `is_done()`.
    fn finish(mut self) -> CopyOutcome {
        let mut error = self.state.error.lock().take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() && error.is_none() {
                error = Some("copy worker panicked".to_string());
            }
        }
        CopyOutcome {
            source: self.source,
            destination: self.destination,
            error,
        }
    }
}

/// Snapshot of a pending task for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct CopyStatus {
    pub destination: PathBuf,
    pub done: bool,
    pub error: Option<String>,
}

/// Result of a reaped task
#[derive(Debug, Clone, PartialEq)]
pub struct CopyOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub error: Option<String>,
}

/// Destination for `source` inside `dir`.
///
/// An empty `dir` leaves the source path unchanged.
pub fn copy_destination(dir: &Path, source: &Path) -> PathBuf {
    if dir.as_os_str().is_empty() {
        return source.to_path_buf();
    }
    storage::join_path(dir, &storage::base_name(source))
}

/// Spawns copy workers and reaps them in submission order
pub struct CopyDispatcher {
    destination_dir: Option<PathBuf>,
    pending: VecDeque<CopyTask>,
    copier: CopyFn,
    spawned: u64,
}

impl CopyDispatcher {
    /// Dispatcher copying into `destination_dir`; `None` disables copies
    pub fn new(destination_dir: Option<PathBuf>) -> Self {
        Self::with_copier(
            destination_dir,
            Arc::new(|source: &Path, target: &Path| storage::copy_overwrite(source, target)),
        )
    }

    /// Dispatcher with a custom copy routine
    pub fn with_copier(destination_dir: Option<PathBuf>, copier: CopyFn) -> Self {
        Self {
            destination_dir: destination_dir.filter(|dir| !dir.as_os_str().is_empty()),
            pending: VecDeque::new(),
            copier,
            spawned: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.destination_dir.is_some()
    }

    pub fn destination_dir(&self) -> Option<&Path> {
        self.destination_dir.as_deref()
    }

    /// Start copying `source` in the background.
    ///
    /// Returns the destination path, or `None` when no destination is configured.
    pub fn submit(&mut self, source: &Path) -> Option<PathBuf> {
        let dir = self.destination_dir.as_ref()?;
        let destination = copy_destination(dir, source);
        log::info!("{}: starting copy thread", source.display());

        let state = Arc::new(CopyState::default());
        let worker_state = state.clone();
        let copier = self.copier.clone();
        let worker_source = source.to_path_buf();
        let worker_destination = destination.clone();

        self.spawned += 1;
        let spawn_result = std::thread::Builder::new()
            .name(format!("mdet-copy-{}", self.spawned))
            .spawn(move || {
                let error = copier(&worker_source, &worker_destination);
                *worker_state.error.lock() = error;
                worker_state.done.store(true, Ordering::Release);
            });

        let handle = match spawn_result {
            Ok(handle) => Some(handle),
            Err(e) => {
                *state.error.lock() = Some(format!("failed to spawn copy thread: {}", e));
                state.done.store(true, Ordering::Release);
                None
            }
        };

        self.pending.push_back(CopyTask {
            source: source.to_path_buf(),
            destination: destination.clone(),
            state,
            handle,
        });
        Some(destination)
    }

    /// Reap finished tasks from the head of the queue.
    ///
    /// Stops at the first task that is still running.
    pub fn reap(&mut self) -> Vec<CopyOutcome> {
        let mut reaped = Vec::new();
        while self.pending.front().is_some_and(CopyTask::is_done) {
            let Some(task) = self.pending.pop_front() else { break };
            let outcome = task.finish();
            log_outcome(&outcome);
            reaped.push(outcome);
        }
        reaped
    }

    /// Wait for every outstanding copy, in submission order
    pub fn drain(&mut self) -> Vec<CopyOutcome> {
        let mut reaped = Vec::new();
        while let Some(task) = self.pending.pop_front() {
            if !task.is_done() {
                log::info!("{}: waiting for copy thread", task.destination.display());
            }
            let outcome = task.finish();
            log_outcome(&outcome);
            reaped.push(outcome);
        }
        reaped
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn statuses(&self) -> Vec<CopyStatus> {
        self.pending.iter().map(CopyTask::status).collect()
    }
}

impl Drop for CopyDispatcher {
    fn drop(&mut self) {
        self.drain();
    }
}

fn log_outcome(outcome: &CopyOutcome) {
    match &outcome.error {
        Some(error) => log::error!("{}: ERROR: {}", outcome.destination.display(), error),
        None => log::info!("{}: copy finished", outcome.destination.display()),
    }
}
