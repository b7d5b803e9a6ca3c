use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::MirrorResult;
use crate::logging::{LogFormat, LogLevel};
use crate::sync::{SyncBuilder, Synchronization};

/// Process-wide options, read-only for the duration of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Log every event and filesystem mutation
    pub verbose: bool,
    /// Watch the enclosing project root instead of each source directory
    pub watch_project: bool,
    /// Leave existing destination content in place instead of clearing it first
    pub keep: bool,
    /// Relative paths excluded together with everything below them
    pub exclude: Vec<String>,
    /// Glob patterns matched against every prefix of a relative path
    pub exclude_patterns: Vec<String>,
}

impl Options {
    pub fn with_verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn with_watch_project(mut self, enabled: bool) -> Self {
        self.watch_project = enabled;
        self
    }

    pub fn with_keep(mut self, enabled: bool) -> Self {
        self.keep = enabled;
        self
    }

    /// Add an excluded relative path
    pub fn with_exclude(mut self, path: impl Into<String>) -> Self {
        self.exclude.push(path.into());
        self
    }

    /// Add an excluded glob pattern
    pub fn with_exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Fold another set of options into this one. Flags are OR-ed, lists appended.
    pub fn merge(mut self, other: Options) -> Self {
        self.verbose |= other.verbose;
        self.watch_project |= other.watch_project;
        self.keep |= other.keep;
        self.exclude.extend(other.exclude);
        self.exclude_patterns.extend(other.exclude_patterns);
        self
    }
}

/// One `[[sync]]` table of a configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    /// Overrides the trailing-separator merge marker when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

/// Contents of a treemirror TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    #[serde(flatten)]
    pub options: Options,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    #[serde(rename = "sync")]
    pub syncs: Vec<SyncEntry>,
}

impl MirrorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> MirrorResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MirrorError::io(path, e))?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> MirrorResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Feed every `[[sync]]` table into a builder, in file order
    pub fn apply_to(&self, builder: &mut SyncBuilder) -> MirrorResult<()> {
        for entry in &self.syncs {
            match entry.merge {
                Some(merge) => builder.push(Synchronization::new(
                    entry.sources.iter().map(PathBuf::from).collect(),
                    entry.destinations.iter().map(PathBuf::from).collect(),
                    merge,
                )?),
                None => builder.group(&entry.sources, &entry.destinations)?,
            }
        }
        Ok(())
    }
}
