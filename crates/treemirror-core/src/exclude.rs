//! Exclusion filter applied to paths relative to their source root.

use std::path::{Component, Path};
use glob::{MatchOptions, Pattern};

use crate::config::Options;
use crate::error::MirrorResult;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A compiled exclusion pattern.
///
/// Patterns without a separator match against the final segment of a
/// candidate, so `*.log` excludes `a/b/c.log` as well as `c.log`.
#[derive(Debug, Clone)]
struct ExcludePattern {
    pattern: Pattern,
    base_only: bool,
}

impl ExcludePattern {
    fn new(raw: &str) -> MirrorResult<Self> {
        Ok(Self {
            pattern: Pattern::new(raw)?,
            base_only: !raw.contains('/'),
        })
    }

    fn matches(&self, candidate: &str) -> bool {
        let subject = if self.base_only {
            candidate.rsplit('/').next().unwrap_or(candidate)
        } else {
            candidate
        };
        self.pattern.matches_with(subject, MATCH_OPTIONS)
    }
}

/// Decides whether a relative path should be left out of every destination
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    paths: Vec<String>,
    patterns: Vec<ExcludePattern>,
}

impl ExclusionFilter {
    /// Compile the exclusion lists of the given options
    pub fn from_options(options: &Options) -> MirrorResult<Self> {
        Self::new(&options.exclude, &options.exclude_patterns)
    }

    pub fn new(paths: &[String], patterns: &[String]) -> MirrorResult<Self> {
        Ok(Self {
            paths: paths
                .iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            patterns: patterns
                .iter()
                .map(|p| ExcludePattern::new(p))
                .collect::<MirrorResult<_>>()?,
        })
    }

    /// Whether the filter can never exclude anything
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.patterns.is_empty()
    }

    /// Whether a `/`-separated path relative to its source root is excluded
    pub fn should_exclude(&self, relative: &str) -> bool {
        if relative.is_empty() {
            return false;
        }

        let by_path = self.paths.iter().any(|entry| {
            relative == entry
                || (relative.starts_with(entry.as_str())
                    && relative.as_bytes().get(entry.len()) == Some(&b'/'))
        });
        if by_path {
            return true;
        }

        if self.patterns.is_empty() {
            return false;
        }

        // every prefix a/, a/b, a/b/c so a pattern can hit an intermediate directory
        let mut end = 0;
        loop {
            let next = relative[end..].find('/').map(|i| end + i);
            let prefix = &relative[..next.unwrap_or(relative.len())];
            if self.patterns.iter().any(|p| p.matches(prefix)) {
                return true;
            }
            match next {
                Some(i) => end = i + 1,
                None => return false,
            }
        }
    }
}

/// Convert `path` to a `/`-separated key relative to `root`
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut key = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                if !key.is_empty() {
                    key.push('/');
                }
                key.push_str(&part.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(key)
}
