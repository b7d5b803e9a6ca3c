//! Output formatting utilities for CLI

use console::style;
use treemirror_core::Synchronization;

/// Format one synchronization as `sources -> destinations`
pub fn format_sync(sync: &Synchronization) -> String {
    let join = |paths: &[std::path::PathBuf]| {
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mode = if sync.is_merge() { "merge" } else { "nested" };
    format!(
        "{} {} {} {}",
        style(join(sync.sources())).cyan(),
        style("->").dim(),
        style(join(sync.destinations())).green(),
        style(format!("({})", mode)).dim()
    )
}

/// Format an error message
pub fn format_error(msg: &str) -> String {
    style(format!("Error: {}", msg)).red().to_string()
}

/// Format a success message
pub fn format_success(msg: &str) -> String {
    style(format!("Success: {}", msg)).green().to_string()
}

/// Format a warning message
pub fn format_warning(msg: &str) -> String {
    style(format!("Warning: {}", msg)).yellow().to_string()
}

/// Format an info message
pub fn format_info(msg: &str) -> String {
    style(msg).blue().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_sync() {
        let sync = Synchronization::new(
            vec![PathBuf::from("a"), PathBuf::from("b")],
            vec![PathBuf::from("out")],
            true,
        )
        .unwrap();
        let formatted = format_sync(&sync);
        assert!(formatted.contains("a, b"));
        assert!(formatted.contains("out"));
        assert!(formatted.contains("(merge)"));
    }

    #[test]
    fn test_format_messages() {
        assert!(format_error("boom").contains("Error: boom"));
        assert!(format_success("done").contains("Success: done"));
        assert!(format_warning("hmm").contains("Warning: hmm"));
        assert!(format_info("fyi").contains("fyi"));
    }
}
