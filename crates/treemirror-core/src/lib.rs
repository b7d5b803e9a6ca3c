//! Core types for treemirror.
//!
//! This crate holds the synchronization model, the exclusion filter, the
//! filesystem primitives and the bulk mirror engine. The live watch engine
//! lives in `treemirror-watch` and builds on the same types.

pub mod config;
pub mod error;
pub mod exclude;
pub mod fs;
pub mod logging;
pub mod mirror;
pub mod sync;

// Re-export commonly used types
pub use crate::config::{MirrorConfig, Options, SyncEntry};
pub use crate::error::{MirrorError, MirrorResult};
pub use crate::exclude::{relative_key, ExclusionFilter};
pub use crate::fs::{FileSystem, LocalFs};
pub use crate::logging::{init_logging, LogFormat, LogLevel};
pub use crate::mirror::{mirror_directories, BulkMirror};
pub use crate::sync::{validate_synchronizations, SyncBuilder, Synchronization};
