use std::io;
use std::path::{Path, PathBuf};
use glob::PatternError;
use thiserror::Error;

/// Custom result type for treemirror operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Custom error type for treemirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{} operation(s) failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<MirrorError>),
}

fn join_errors(errors: &[MirrorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MirrorError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MirrorError::Config(msg.into())
    }

    /// Create a new IO error bound to the path it happened on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        MirrorError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a new capability negotiation error
    pub fn capability<S: Into<String>>(msg: S) -> Self {
        MirrorError::Capability(msg.into())
    }

    /// Create a new watch error
    pub fn watch<S: Into<String>>(msg: S) -> Self {
        MirrorError::Watch(msg.into())
    }

    /// Collapse a list of failures into one error, or `None` when empty
    pub fn aggregate(mut errors: Vec<MirrorError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(MirrorError::Aggregate(errors)),
        }
    }

    /// Whether this error should fail a run before any I/O happens
    pub fn is_config(&self) -> bool {
        matches!(self, MirrorError::Config(_) | MirrorError::Pattern(_))
    }
}

impl From<PatternError> for MirrorError {
    fn from(err: PatternError) -> Self {
        Self::Pattern(err.to_string())
    }
}

impl From<toml::de::Error> for MirrorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<notify::Error> for MirrorError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MirrorError::config("must supply at least one synchronization");
        assert_eq!(
            err.to_string(),
            "Configuration error: must supply at least one synchronization"
        );

        let err = MirrorError::io(
            "/tmp/out/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "IO error at /tmp/out/a.txt: denied");
    }

    #[test]
    fn test_aggregate() {
        assert!(MirrorError::aggregate(Vec::new()).is_none());

        let single = MirrorError::aggregate(vec![MirrorError::watch("gone")]).unwrap();
        assert!(matches!(single, MirrorError::Watch(_)));

        let many = MirrorError::aggregate(vec![
            MirrorError::watch("first"),
            MirrorError::config("second"),
        ])
        .unwrap();
        assert_eq!(
            many.to_string(),
            "2 operation(s) failed: Watch error: first; Configuration error: second"
        );
    }

    #[test]
    fn test_error_conversion() {
        let pattern_err = glob::Pattern::new("[").unwrap_err();
        let err: MirrorError = pattern_err.into();
        assert!(matches!(err, MirrorError::Pattern(_)));
        assert!(err.is_config());

        let err = MirrorError::io("src/a.txt", io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(matches!(err, MirrorError::Io { ref path, .. } if path == Path::new("src/a.txt")));
        assert!(!err.is_config());
    }
}
