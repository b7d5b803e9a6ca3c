//! Synchronization model and the builder that assembles it from user input.
//!
//! A [`Synchronization`] maps an ordered list of source directories onto a set
//! of destination directories. In merge mode the contents of every source are
//! overlaid directly into each destination, later sources winning; otherwise
//! each source lands in a sub-directory named after itself.

use std::path::{Component, Path, PathBuf};

use crate::error::{MirrorError, MirrorResult};

/// Separator a source path ends with to request merge mode
pub const MERGE_MARKER: char = '/';

/// Whether a user-written source path carries the merge marker
pub fn has_merge_marker(raw: &str) -> bool {
    raw.ends_with(MERGE_MARKER) || raw.ends_with(std::path::MAIN_SEPARATOR)
}

/// One configured mapping of sources to destinations.
///
/// Only [`Synchronization::new`] builds one, so every value is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synchronization {
    sources: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
    merge: bool,
}

impl Synchronization {
    /// Create a synchronization. Both lists must be non-empty.
    pub fn new(sources: Vec<PathBuf>, destinations: Vec<PathBuf>, merge: bool) -> MirrorResult<Self> {
        if sources.is_empty() {
            return Err(MirrorError::config("synchronization must name at least one source"));
        }
        if destinations.is_empty() {
            return Err(MirrorError::config(format!(
                "no destination given for source(s) {}",
                display_list(&sources)
            )));
        }
        if !merge {
            for source in &sources {
                source_name(source)?;
            }
        }
        Ok(Self {
            sources,
            destinations,
            merge,
        })
    }

    /// Sources in priority order, lowest first
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn destinations(&self) -> &[PathBuf] {
        &self.destinations
    }

    /// Whether source contents are overlaid directly into the destinations
    pub fn is_merge(&self) -> bool {
        self.merge
    }

    /// Whether overlapping source paths need precedence tracking
    pub fn needs_precedence(&self) -> bool {
        self.merge && self.sources.len() > 1
    }

    /// Directory a given source writes into under a given destination
    pub fn output_dir(&self, source: &Path, destination: &Path) -> MirrorResult<PathBuf> {
        if self.merge {
            Ok(destination.to_path_buf())
        } else {
            Ok(destination.join(source_name(source)?))
        }
    }

    /// Every directory this synchronization owns, deduplicated
    pub fn output_dirs(&self) -> MirrorResult<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for source in &self.sources {
            for destination in &self.destinations {
                let dir = self.output_dir(source, destination)?;
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        Ok(dirs)
    }
}

/// Final path component of a source directory
pub fn source_name(source: &Path) -> MirrorResult<String> {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            MirrorError::config(format!(
                "cannot derive a directory name from source {}",
                source.display()
            ))
        })
}

fn display_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lexically normalise a path for overlap comparison
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Reject configurations that cannot be mirrored deterministically.
///
/// Fails on an empty list and on output locations of distinct
/// synchronizations that are equal or nested inside one another.
pub fn validate_synchronizations(syncs: &[Synchronization]) -> MirrorResult<()> {
    if syncs.is_empty() {
        return Err(MirrorError::config("must supply at least one synchronization"));
    }

    let mut outputs: Vec<(usize, PathBuf)> = Vec::new();
    for (index, sync) in syncs.iter().enumerate() {
        for dir in sync.output_dirs()? {
            outputs.push((index, normalize(&dir)));
        }
    }

    for (i, (owner_a, a)) in outputs.iter().enumerate() {
        for (owner_b, b) in &outputs[i + 1..] {
            if a.starts_with(b) || b.starts_with(a) {
                return Err(MirrorError::config(format!(
                    "output locations {} (synchronization {}) and {} (synchronization {}) overlap",
                    a.display(),
                    owner_a + 1,
                    b.display(),
                    owner_b + 1
                )));
            }
        }
    }

    Ok(())
}

/// Split a `SRC[,SRC..]:DEST` mirror group into its sources and destination
pub fn parse_mirror_group(group: &str) -> MirrorResult<(Vec<String>, String)> {
    let parts: Vec<&str> = group.split(':').collect();
    if parts.len() != 2 {
        return Err(MirrorError::config(format!(
            "format for mirror should be src:dest but got {}",
            group
        )));
    }

    let sources: Vec<String> = parts[0]
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if sources.is_empty() {
        return Err(MirrorError::config(format!(
            "mirror group {} must name at least one source",
            group
        )));
    }

    let destination = parts[1].trim();
    if destination.is_empty() || destination.contains(',') {
        return Err(MirrorError::config(format!(
            "mirror group {} must name exactly one destination",
            group
        )));
    }

    Ok((sources, destination.to_string()))
}

/// Accumulates synchronizations from CLI groups and configuration files
#[derive(Debug, Default)]
pub struct SyncBuilder {
    syncs: Vec<Synchronization>,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an already constructed synchronization
    pub fn push(&mut self, sync: Synchronization) {
        self.syncs.push(sync);
    }

    /// Add a group whose merge mode is inferred from the sources' markers.
    ///
    /// Either every source carries the merge marker or none does.
    pub fn group(&mut self, sources: &[String], destinations: &[String]) -> MirrorResult<()> {
        let marked = sources.iter().filter(|s| has_merge_marker(s)).count();
        if marked != 0 && marked != sources.len() {
            return Err(MirrorError::config(format!(
                "either all or none of the sources {} must end with {}",
                sources.join(", "),
                MERGE_MARKER
            )));
        }

        self.push(Synchronization::new(
            sources.iter().map(PathBuf::from).collect(),
            destinations.iter().map(PathBuf::from).collect(),
            marked != 0,
        )?);
        Ok(())
    }

    /// Add one synchronization per source, each targeting every destination
    pub fn fan_out(&mut self, sources: &[String], destinations: &[String]) -> MirrorResult<()> {
        for source in sources {
            self.group(std::slice::from_ref(source), destinations)?;
        }
        Ok(())
    }

    /// Add a `SRC[,SRC..]:DEST` mirror group
    pub fn mirror(&mut self, group: &str) -> MirrorResult<()> {
        let (sources, destination) = parse_mirror_group(group)?;
        self.group(&sources, &[destination])
    }

    pub fn len(&self) -> usize {
        self.syncs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syncs.is_empty()
    }

    /// Validate and return the synchronizations in insertion order
    pub fn build(self) -> MirrorResult<Vec<Synchronization>> {
        validate_synchronizations(&self.syncs)?;
        Ok(self.syncs)
    }
}
