//! Keep destination directory trees identical to one or more source trees.
//!
//! This crate re-exports the workspace members: the synchronization model and
//! bulk mirror engine from `treemirror-core`, the live watch engine from
//! `treemirror-watch` and the command line from `treemirror-cli`.

pub use treemirror_cli as cli;
pub use treemirror_core as core;
pub use treemirror_watch as watch;

pub use treemirror_core::{mirror_directories, MirrorError, MirrorResult, Options, Synchronization};
pub use treemirror_watch::{watch_directories, WatchHandle};

/// Version of treemirror
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
