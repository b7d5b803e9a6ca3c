//! Ownership of output paths shared by several merged sources.
//!
//! Sources are ranked by their position in the synchronization: a higher
//! index has a higher priority. The table remembers, for every output path,
//! which source currently supplies it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What to do about an "exists" event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistsOutcome {
    /// The event's source now owns the path and must be copied
    Copy,
    /// A higher-priority source already supplies the path
    Shadowed { owner: usize },
}

/// What to do about a "removed" event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The destination shows another source's copy; nothing changes
    Unaffected { owner: usize },
    /// Probe these sources, in order, for a copy to reveal; remove if none has one
    Fallback { candidates: Vec<usize> },
}

#[derive(Debug, Clone)]
pub struct PrecedenceTable {
    roots: Vec<PathBuf>,
    owners: HashMap<String, usize>,
}

impl PrecedenceTable {
    /// Create a table for canonical source roots listed lowest priority first
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            owners: HashMap::new(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Priority of a canonical root
    pub fn position(&self, root: &Path) -> Option<usize> {
        self.roots.iter().position(|r| r == root)
    }

    /// Source currently supplying `target`
    pub fn owner(&self, target: &str) -> Option<usize> {
        self.owners.get(target).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Record that source `position` has `target`
    pub fn on_exists(&mut self, position: usize, target: &str) -> ExistsOutcome {
        match self.owner(target) {
            Some(owner) if owner > position => ExistsOutcome::Shadowed { owner },
            _ => {
                self.assign(target, position);
                ExistsOutcome::Copy
            }
        }
    }

    /// Decide how source `position` losing `target` affects the destination
    pub fn on_removed(&self, position: usize, target: &str) -> RemovalOutcome {
        match self.owner(target) {
            Some(owner) if owner != position => RemovalOutcome::Unaffected { owner },
            _ => RemovalOutcome::Fallback {
                candidates: (0..position).rev().collect(),
            },
        }
    }

    /// Make `position` the owner of `target`
    pub fn assign(&mut self, target: &str, position: usize) {
        self.owners.insert(target.to_string(), position);
    }

    /// Forget `target` once no source supplies it
    pub fn release(&mut self, target: &str) {
        self.owners.remove(target);
    }
}
