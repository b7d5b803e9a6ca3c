//! CLI run modes

pub mod mirror;
pub mod watch;

pub use mirror::execute as execute_mirror;
pub use watch::execute as execute_watch;
