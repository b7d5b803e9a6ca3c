//! Live mirroring driven by change notifications.
//!
//! A session owns everything it mutates: the routing of watch roots to
//! synchronizations, the precedence tables and the operation queue. All
//! events flow through one channel into one task, so they are handled
//! strictly in arrival order. The existence probe of a removal fallback is
//! awaited inside that task before the next event is looked at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use treemirror_core::config::Options;
use treemirror_core::error::{MirrorError, MirrorResult};
use treemirror_core::exclude::ExclusionFilter;
use treemirror_core::fs::FileSystem;
use treemirror_core::sync::{source_name, validate_synchronizations, Synchronization};

use crate::precedence::{ExistsOutcome, PrecedenceTable, RemovalOutcome};
use crate::queue::{FileOperation, OperationQueue, QueueStats};
use crate::service::{
    Capability, ChangeEvent, EntryKind, EventSink, Inbound, NotificationService,
    SubscriptionRequest, WatchMode,
};

/// One synchronization fed by a watch root
#[derive(Debug, Clone)]
struct Owner {
    sync: usize,
    /// Index of the root among the synchronization's sources
    position: usize,
    /// Sub-directory the root is mirrored into, `None` in merge mode
    prefix: Option<String>,
    root: PathBuf,
}

impl Owner {
    fn target(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        }
    }
}

#[derive(Debug)]
struct SyncState {
    destinations: Vec<PathBuf>,
    precedence: Option<PrecedenceTable>,
}

struct Session {
    routes: HashMap<PathBuf, Vec<Owner>>,
    syncs: Vec<SyncState>,
    filter: ExclusionFilter,
    queue: OperationQueue,
}

impl Session {
    async fn handle(&mut self, event: ChangeEvent) {
        if event.kind == EntryKind::Directory {
            return;
        }
        let Some(owners) = self.routes.get(&event.root).cloned() else {
            warn!(
                "Ignoring event for {} from unknown root {}",
                event.name,
                event.root.display()
            );
            return;
        };
        if self.filter.should_exclude(&event.name) {
            debug!("Excluded {}", event.name);
            return;
        }

        for owner in &owners {
            if let Some(operation) = self.resolve(owner, &event).await {
                self.queue.push(operation);
            }
        }
    }

    /// Decide the operation an event causes for one owning synchronization
    async fn resolve(&mut self, owner: &Owner, event: &ChangeEvent) -> Option<FileOperation> {
        let target = owner.target(&event.name);
        let sync = &mut self.syncs[owner.sync];
        let destinations = sync.destinations.clone();

        let Some(table) = sync.precedence.as_mut() else {
            return Some(if event.exists {
                debug!("Changed {}", target);
                FileOperation::Copy {
                    source: owner.root.join(&event.name),
                    target,
                    destinations,
                }
            } else {
                debug!("Removed {}", target);
                FileOperation::Remove {
                    target,
                    destinations,
                }
            });
        };

        if event.exists {
            return match table.on_exists(owner.position, &target) {
                ExistsOutcome::Copy => {
                    debug!("Changed {} (source {})", target, owner.position + 1);
                    Some(FileOperation::Copy {
                        source: owner.root.join(&event.name),
                        target,
                        destinations,
                    })
                }
                ExistsOutcome::Shadowed { owner: shadow } => {
                    debug!("{} is shadowed by source {}", target, shadow + 1);
                    None
                }
            };
        }

        match table.on_removed(owner.position, &target) {
            RemovalOutcome::Unaffected { owner: supplier } => {
                debug!("{} is still supplied by source {}", target, supplier + 1);
                None
            }
            RemovalOutcome::Fallback { candidates } => {
                for candidate in candidates {
                    let path = table.roots()[candidate].join(&event.name);
                    if is_file(&path).await {
                        debug!("Revealing {} from source {}", target, candidate + 1);
                        table.assign(&target, candidate);
                        return Some(FileOperation::Copy {
                            source: path,
                            target,
                            destinations,
                        });
                    }
                }
                debug!("Removed {}", target);
                table.release(&target);
                Some(FileOperation::Remove {
                    target,
                    destinations,
                })
            }
        }
    }

    async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut stop: watch::Receiver<bool>,
        service: Arc<dyn NotificationService>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                message = inbound.recv() => match message {
                    Some(Inbound::Batch(batch)) => {
                        for event in batch {
                            self.handle(event).await;
                        }
                    }
                    Some(Inbound::Flush(done)) => {
                        self.queue.idle().await;
                        let _ = done.send(());
                    }
                    None => break,
                },
            }
        }

        self.queue.close();
        service.close().await;
        info!("Watch session stopped");
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Stops a watch session from anywhere
#[derive(Debug, Clone)]
pub struct Stopper {
    stop: Arc<watch::Sender<bool>>,
}

impl Stopper {
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

/// Handle to a running watch session.
///
/// Dropping the handle and every [`Stopper`] stops the session.
pub struct WatchHandle {
    inbound: mpsc::UnboundedSender<Inbound>,
    stop: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
    queue: OperationQueue,
    roots: Vec<PathBuf>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

impl WatchHandle {
    /// Resolve once every event delivered so far is handled and applied
    pub async fn flush(&self) -> MirrorResult<()> {
        let (done, finished) = oneshot::channel();
        self.inbound
            .send(Inbound::Flush(done))
            .map_err(|_| MirrorError::watch("watch session has stopped"))?;
        finished
            .await
            .map_err(|_| MirrorError::watch("watch session has stopped"))
    }

    /// Stop accepting events and release the notification service.
    ///
    /// Queued operations are abandoned; one already executing may finish.
    pub async fn stop(self) -> MirrorResult<()> {
        self.stop.send_replace(true);
        self.wait().await
    }

    /// A cloneable way to stop the session while [`WatchHandle::wait`] runs
    pub fn stopper(&self) -> Stopper {
        Stopper {
            stop: self.stop.clone(),
        }
    }

    /// Resolve when the session ends
    pub async fn wait(self) -> MirrorResult<()> {
        self.task
            .await
            .map_err(|e| MirrorError::watch(format!("watch session failed: {}", e)))
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Canonical source roots being watched
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

fn required_capabilities(options: &Options) -> Vec<Capability> {
    let mut required = vec![Capability::Recursive, Capability::InitialState];
    if options.watch_project {
        required.push(Capability::RelativeRoot);
    }
    required
}

/// Start mirroring `syncs` live.
///
/// Returns once every source root is watched and subscribed. Destinations are
/// cleared first unless `options.keep` is set; the initial state reported by
/// each subscription then repopulates them.
pub async fn watch_directories(
    syncs: &[Synchronization],
    options: &Options,
    service: Arc<dyn NotificationService>,
    fs: Arc<dyn FileSystem>,
) -> MirrorResult<WatchHandle> {
    validate_synchronizations(syncs)?;
    let filter = ExclusionFilter::from_options(options)?;

    let mut roots: Vec<PathBuf> = Vec::new();
    let mut routes: HashMap<PathBuf, Vec<Owner>> = HashMap::new();
    let mut states = Vec::with_capacity(syncs.len());
    for (index, sync) in syncs.iter().enumerate() {
        let mut sources = Vec::with_capacity(sync.sources().len());
        for (position, source) in sync.sources().iter().enumerate() {
            let root = tokio::fs::canonicalize(source)
                .await
                .map_err(|e| MirrorError::io(source, e))?;
            let prefix = if sync.is_merge() {
                None
            } else {
                Some(source_name(source)?)
            };
            if !roots.contains(&root) {
                roots.push(root.clone());
            }
            routes.entry(root.clone()).or_default().push(Owner {
                sync: index,
                position,
                prefix,
                root: root.clone(),
            });
            sources.push(root);
        }

        states.push(SyncState {
            destinations: sync.destinations().to_vec(),
            precedence: sync
                .needs_precedence()
                .then(|| PrecedenceTable::new(sources)),
        });
    }

    if !options.keep {
        for sync in syncs {
            for dir in sync.output_dirs()? {
                debug!("Clearing {}", dir.display());
                fs.empty_dir(&dir).await?;
            }
        }
    }

    let capabilities = service.capabilities().await?;
    for capability in required_capabilities(options) {
        if !capabilities.contains(&capability) {
            return Err(MirrorError::capability(format!(
                "notification service does not support {:?}",
                capability
            )));
        }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let mode = if options.watch_project {
        WatchMode::Project
    } else {
        WatchMode::Watch
    };
    if let Err(e) = subscribe_all(service.as_ref(), &roots, mode, &tx).await {
        service.close().await;
        return Err(e);
    }
    info!("Watching {} source root(s)", roots.len());

    let queue = OperationQueue::new(fs);
    let session = Session {
        routes,
        syncs: states,
        filter,
        queue: queue.clone(),
    };
    let (stop, stopped) = watch::channel(false);
    let task = tokio::spawn(session.run(rx, stopped, service));

    Ok(WatchHandle {
        inbound: tx,
        stop: Arc::new(stop),
        task,
        queue,
        roots,
    })
}

async fn subscribe_all(
    service: &dyn NotificationService,
    roots: &[PathBuf],
    mode: WatchMode,
    tx: &mpsc::UnboundedSender<Inbound>,
) -> MirrorResult<()> {
    for (index, root) in roots.iter().enumerate() {
        let watch_root = service.watch(root, mode).await?;
        if let Some(relative) = &watch_root.relative_root {
            debug!(
                "Watching {} relative to {}",
                relative.display(),
                watch_root.root.display()
            );
        }
        let request = SubscriptionRequest {
            name: format!("treemirror-{}", index + 1),
            root: root.clone(),
            watch_root: watch_root.root,
            relative_root: watch_root.relative_root,
        };
        service
            .subscribe(request, EventSink::new(tx.clone()))
            .await?;
    }
    Ok(())
}
