//! Contract between the watch engine and the change-notification service.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use treemirror_core::error::MirrorResult;

/// Optional features a notification service may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Changes anywhere below a watched directory are reported
    Recursive,
    /// A new subscription first reports every entry that already exists
    InitialState,
    /// Subscriptions can be scoped to a sub-directory of the watch root
    RelativeRoot,
}

/// How a source directory is registered with the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Watch the directory itself
    #[default]
    Watch,
    /// Watch the enclosing project root and scope subscriptions below it
    Project,
}

/// Result of a watch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    /// Directory the service actually watches
    pub root: PathBuf,
    /// Requested directory relative to `root`, when they differ
    pub relative_root: Option<PathBuf>,
}

/// Subscription for every change below one source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub name: String,
    /// Root reported back in every event of this subscription
    pub root: PathBuf,
    pub watch_root: PathBuf,
    pub relative_root: Option<PathBuf>,
}

impl SubscriptionRequest {
    /// Directory whose descendants the subscription covers
    pub fn directory(&self) -> PathBuf {
        match &self.relative_root {
            Some(relative) => self.watch_root.join(relative),
            None => self.watch_root.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One changed entry as reported by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub root: PathBuf,
    /// `/`-separated path relative to `root`
    pub name: String,
    pub exists: bool,
    pub kind: EntryKind,
}

impl ChangeEvent {
    pub fn file(root: impl Into<PathBuf>, name: impl Into<String>, exists: bool) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            exists,
            kind: EntryKind::File,
        }
    }

    pub fn directory(root: impl Into<PathBuf>, name: impl Into<String>, exists: bool) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            exists,
            kind: EntryKind::Directory,
        }
    }
}

/// Message consumed by a watch session
#[derive(Debug)]
pub(crate) enum Inbound {
    Batch(Vec<ChangeEvent>),
    Flush(oneshot::Sender<()>),
}

/// Sending half handed to the service on subscribe
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    /// Deliver one batch. Returns `false` once the session has stopped.
    pub fn send(&self, batch: Vec<ChangeEvent>) -> bool {
        if batch.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(Inbound::Batch(batch)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a standalone [`EventSink`]
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

impl EventStream {
    /// Next delivered batch, or `None` once every sink is dropped
    pub async fn next_batch(&mut self) -> Option<Vec<ChangeEvent>> {
        while let Some(message) = self.rx.recv().await {
            if let Inbound::Batch(batch) = message {
                return Some(batch);
            }
        }
        None
    }
}

/// Create a sink/stream pair outside of a watch session
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink::new(tx), EventStream { rx })
}

/// A service reporting filesystem changes below watched directories
#[async_trait]
pub trait NotificationService: Send + Sync + 'static {
    /// Capabilities this service supports
    async fn capabilities(&self) -> MirrorResult<HashSet<Capability>>;

    /// Start watching `path`, which must be canonical
    async fn watch(&self, path: &std::path::Path, mode: WatchMode) -> MirrorResult<WatchRoot>;

    /// Start delivering change batches for a subscription into `sink`
    async fn subscribe(&self, request: SubscriptionRequest, sink: EventSink) -> MirrorResult<()>;

    /// Drop every watch and subscription
    async fn close(&self);
}
