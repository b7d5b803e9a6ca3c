//! Serialized application of destination mutations.
//!
//! Every change the watch engine decides on becomes a [`FileOperation`]. The
//! queue runs one operation at a time in push order; pushing an operation for
//! a path and destination set that is still pending replaces the pending one.
//! An operation that has already started is never replaced.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use treemirror_core::error::{MirrorError, MirrorResult};
use treemirror_core::fs::FileSystem;

/// One mutation of every destination of a synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    /// Copy `source` to `target` below each destination
    Copy {
        source: PathBuf,
        target: String,
        destinations: Vec<PathBuf>,
    },
    /// Remove `target` below each destination
    Remove {
        target: String,
        destinations: Vec<PathBuf>,
    },
}

impl FileOperation {
    /// Output path relative to the destinations
    pub fn target(&self) -> &str {
        match self {
            FileOperation::Copy { target, .. } | FileOperation::Remove { target, .. } => target,
        }
    }

    pub fn destinations(&self) -> &[PathBuf] {
        match self {
            FileOperation::Copy { destinations, .. }
            | FileOperation::Remove { destinations, .. } => destinations,
        }
    }

    /// Whether applying `self` makes a pending `other` redundant.
    ///
    /// Only operations on the same path below the same destinations qualify.
    pub fn supersedes(&self, other: &FileOperation) -> bool {
        self.target() == other.target() && self.destinations() == other.destinations()
    }

    fn describe(&self) -> String {
        match self {
            FileOperation::Copy { source, target, .. } => {
                format!("copy {} -> {}", source.display(), target)
            }
            FileOperation::Remove { target, .. } => format!("remove {}", target),
        }
    }
}

/// Counters describing what a queue has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub superseded: u64,
    pub applied: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<FileOperation>,
    running: bool,
    closed: bool,
    stats: QueueStats,
}

struct Shared {
    fs: Arc<dyn FileSystem>,
    state: Mutex<QueueState>,
    busy: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // the state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Single-flight queue of [`FileOperation`]s
#[derive(Clone)]
pub struct OperationQueue {
    shared: Arc<Shared>,
}

impl OperationQueue {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                fs,
                state: Mutex::new(QueueState::default()),
                busy,
            }),
        }
    }

    /// Enqueue an operation without waiting for it.
    ///
    /// Must be called from within a tokio runtime: an idle queue starts its
    /// drain task here.
    pub fn push(&self, operation: FileOperation) {
        let first = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.stats.pushed += 1;

            let before = state.pending.len();
            state.pending.retain(|pending| !operation.supersedes(pending));
            let superseded = (before - state.pending.len()) as u64;
            if superseded > 0 {
                debug!("Superseded pending operation on {}", operation.target());
                state.stats.superseded += superseded;
            }
            state.pending.push_back(operation);

            if state.running {
                return;
            }
            state.running = true;
            self.shared.busy.send_replace(true);
            state.pending.pop_front()
        };

        if let Some(first) = first {
            tokio::spawn(drain(self.shared.clone(), first));
        }
    }

    /// Number of operations waiting to start
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }

    /// Resolve once nothing is running or pending
    pub async fn idle(&self) {
        let mut busy = self.shared.busy.subscribe();
        let _ = busy.wait_for(|running| !*running).await;
    }

    /// Drop pending operations and refuse new ones.
    ///
    /// An operation already executing is left to finish.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.closed = true;
        if !state.pending.is_empty() {
            debug!("Abandoning {} queued operation(s)", state.pending.len());
            state.pending.clear();
        }
    }
}

async fn drain(shared: Arc<Shared>, first: FileOperation) {
    let mut next = Some(first);
    while let Some(operation) = next {
        // a panicking filesystem counts as a failed operation
        let result = AssertUnwindSafe(apply(shared.fs.as_ref(), &operation))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(MirrorError::watch("operation panicked")));

        next = {
            let mut state = shared.lock();
            match result {
                Ok(()) => {
                    debug!("Applied {}", operation.describe());
                    state.stats.applied += 1;
                }
                Err(e) => {
                    warn!("Failed to {}: {}", operation.describe(), e);
                    state.stats.failed += 1;
                }
            }

            let next = if state.closed {
                None
            } else {
                state.pending.pop_front()
            };
            if next.is_none() {
                state.running = false;
                shared.busy.send_replace(false);
            }
            next
        };
    }
}

async fn apply(fs: &dyn FileSystem, operation: &FileOperation) -> MirrorResult<()> {
    let results = match operation {
        FileOperation::Copy {
            source,
            target,
            destinations,
        } => {
            join_all(
                destinations
                    .iter()
                    .map(|dest| copy_into(fs, source, dest.join(target))),
            )
            .await
        }
        FileOperation::Remove {
            target,
            destinations,
        } => join_all(destinations.iter().map(|dest| remove_from(fs, dest.join(target)))).await,
    };

    let errors: Vec<MirrorError> = results.into_iter().filter_map(Result::err).collect();
    match MirrorError::aggregate(errors) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

async fn copy_into(fs: &dyn FileSystem, source: &Path, target: PathBuf) -> MirrorResult<()> {
    fs.copy(source, &target).await
}

async fn remove_from(fs: &dyn FileSystem, target: PathBuf) -> MirrorResult<()> {
    fs.remove(&target).await
}
