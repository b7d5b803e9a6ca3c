//! Live watch engine for treemirror.
//!
//! [`watch_directories`] subscribes to a [`NotificationService`] for every
//! source root and keeps the destinations in step, resolving overlapping
//! merged sources through a [`PrecedenceTable`] and applying every change
//! through an [`OperationQueue`].

pub mod notify_service;
pub mod precedence;
pub mod queue;
pub mod service;
pub mod session;

pub use crate::notify_service::NotifyService;
pub use crate::precedence::{ExistsOutcome, PrecedenceTable, RemovalOutcome};
pub use crate::queue::{FileOperation, OperationQueue, QueueStats};
pub use crate::service::{
    event_channel, Capability, ChangeEvent, EntryKind, EventSink, EventStream,
    NotificationService, SubscriptionRequest, WatchMode, WatchRoot,
};
pub use crate::session::{watch_directories, Stopper, WatchHandle};
