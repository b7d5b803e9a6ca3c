//! [`NotificationService`] on top of the platform watcher from `notify`.
//!
//! Raw events only say which paths were touched. Whether a path exists and
//! what kind of entry it is gets decided by a `stat` when the event is
//! delivered, so a burst of changes always converges on the current state of
//! the disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use notify::event::{EventKind, RemoveKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};
use walkdir::WalkDir;

use treemirror_core::error::{MirrorError, MirrorResult};
use treemirror_core::exclude::relative_key;

use crate::service::{
    Capability, ChangeEvent, EventSink, NotificationService, SubscriptionRequest, WatchMode,
    WatchRoot,
};

/// Files or directories marking the root of a project
pub const PROJECT_MARKERS: &[&str] = &[".watchmanconfig", ".git", ".hg", ".svn"];

struct Subscription {
    request: SubscriptionRequest,
    directory: PathBuf,
    sink: EventSink,
    /// Files reported as existing and not yet reported removed
    known: HashSet<String>,
}

impl Subscription {
    /// Translate one touched path into change events
    fn changes(&mut self, path: &Path, name: String, kind: &EventKind) -> Vec<ChangeEvent> {
        let root = &self.request.root;
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => {
                let mut batch = vec![ChangeEvent::directory(root.clone(), name.clone(), true)];
                for file in scan_files(path) {
                    let key = format!("{}/{}", name, file);
                    self.known.insert(key.clone());
                    batch.push(ChangeEvent::file(root.clone(), key, true));
                }
                batch
            }
            Ok(_) => {
                self.known.insert(name.clone());
                vec![ChangeEvent::file(root.clone(), name, true)]
            }
            Err(_) => {
                let mut batch = Vec::new();
                if self.known.remove(&name) {
                    batch.push(ChangeEvent::file(root.clone(), name.clone(), false));
                }

                let prefix = format!("{}/", name);
                let mut gone: Vec<String> = self
                    .known
                    .iter()
                    .filter(|key| key.starts_with(&prefix))
                    .cloned()
                    .collect();
                gone.sort();
                if !gone.is_empty() || matches!(kind, EventKind::Remove(RemoveKind::Folder)) {
                    batch.push(ChangeEvent::directory(root.clone(), name, false));
                }
                for key in gone {
                    self.known.remove(&key);
                    batch.push(ChangeEvent::file(root.clone(), key, false));
                }
                batch
            }
        }
    }
}

/// Relative keys of every file below `dir`, sorted
fn scan_files(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| relative_key(dir, entry.path()))
        .collect()
}

/// Nearest ancestor of `path` (itself included) carrying a project marker
pub fn find_project_root(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|dir| PROJECT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

type Subscriptions = Arc<Mutex<Vec<Subscription>>>;

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, Vec<Subscription>> {
    subscriptions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn dispatch(subscriptions: &Subscriptions, event: Event) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }

    let mut subscriptions = lock(subscriptions);
    for path in &event.paths {
        for subscription in subscriptions.iter_mut() {
            let Some(name) = relative_key(&subscription.directory, path) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let batch = subscription.changes(path, name, &event.kind);
            subscription.sink.send(batch);
        }
    }
    subscriptions.retain(|subscription| !subscription.sink.is_closed());
}

/// Notification service backed by the platform's recommended watcher
pub struct NotifyService {
    subscriptions: Subscriptions,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Mutex<HashSet<PathBuf>>,
}

impl NotifyService {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            watcher: Mutex::new(None),
            watched: Mutex::new(HashSet::new()),
        }
    }

    fn create_watcher(&self) -> MirrorResult<RecommendedWatcher> {
        let subscriptions = self.subscriptions.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => dispatch(&subscriptions, event),
            Err(e) => warn!("Watch error: {}", e),
        })?;
        Ok(watcher)
    }

    fn start_watching(&self, root: &Path) -> MirrorResult<()> {
        let mut watched = self
            .watched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if watched.contains(root) {
            return Ok(());
        }

        let mut watcher = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if watcher.is_none() {
            *watcher = Some(self.create_watcher()?);
        }
        if let Some(watcher) = watcher.as_mut() {
            watcher.watch(root, RecursiveMode::Recursive).map_err(|e| {
                MirrorError::watch(format!("failed to watch {}: {}", root.display(), e))
            })?;
        }
        watched.insert(root.to_path_buf());
        debug!("Watching {}", root.display());
        Ok(())
    }
}

impl Default for NotifyService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationService for NotifyService {
    async fn capabilities(&self) -> MirrorResult<HashSet<Capability>> {
        Ok([
            Capability::Recursive,
            Capability::InitialState,
            Capability::RelativeRoot,
        ]
        .into_iter()
        .collect())
    }

    async fn watch(&self, path: &Path, mode: WatchMode) -> MirrorResult<WatchRoot> {
        let root = match mode {
            WatchMode::Watch => path.to_path_buf(),
            WatchMode::Project => find_project_root(path).unwrap_or_else(|| path.to_path_buf()),
        };
        self.start_watching(&root)?;

        let relative_root = match path.strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => Some(relative.to_path_buf()),
            _ => None,
        };
        Ok(WatchRoot {
            root,
            relative_root,
        })
    }

    async fn subscribe(&self, request: SubscriptionRequest, sink: EventSink) -> MirrorResult<()> {
        let directory = request.directory();
        if !directory.is_dir() {
            return Err(MirrorError::watch(format!(
                "cannot subscribe to {}: not a directory",
                directory.display()
            )));
        }

        let subscriptions = self.subscriptions.clone();
        tokio::task::spawn_blocking(move || {
            // Hold the lock so no live event overtakes the initial state
            let mut subscriptions = lock(&subscriptions);
            let files = scan_files(&directory);
            let batch: Vec<ChangeEvent> = files
                .iter()
                .map(|name| ChangeEvent::file(request.root.clone(), name.clone(), true))
                .collect();
            debug!(
                "Subscription {} starts with {} file(s)",
                request.name,
                batch.len()
            );
            sink.send(batch);
            subscriptions.push(Subscription {
                request,
                directory,
                sink,
                known: files.into_iter().collect(),
            });
        })
        .await
        .map_err(|e| MirrorError::watch(format!("subscription task failed: {}", e)))
    }

    async fn close(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(watcher);
        self.watched
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        lock(&self.subscriptions).clear();
    }
}
