//! Turns command-line arguments and an optional configuration file into the
//! synchronizations and options of one run.

use std::path::Path;

use tracing::warn;
use treemirror_core::{
    logging::level_for,
    sync::{has_merge_marker, MERGE_MARKER},
    ExclusionFilter, LogFormat, LogLevel, MirrorConfig, MirrorError, MirrorResult, Options,
    SyncBuilder, Synchronization,
};

use crate::output::format_warning;
use crate::Cli;

/// Everything a run needs, resolved and validated
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub syncs: Vec<Synchronization>,
    pub options: Options,
    pub watch: bool,
}

/// Load the configuration file named on the command line, if any
pub fn load_file(cli: &Cli) -> MirrorResult<MirrorConfig> {
    match &cli.config {
        Some(path) => MirrorConfig::from_file(path),
        None => Ok(MirrorConfig::default()),
    }
}

/// Log level and format, command line over configuration file
pub fn logging_for(cli: &Cli, file: &MirrorConfig) -> (LogLevel, LogFormat) {
    let verbose = cli.verbose || file.options.verbose;
    let level = file.log_level.unwrap_or_default().max(level_for(verbose));
    let format = cli.log_format.or(file.log_format).unwrap_or_default();
    (level, format)
}

fn cli_options(cli: &Cli) -> Options {
    Options {
        verbose: cli.verbose,
        watch_project: cli.watch_project,
        keep: cli.keep,
        exclude: cli.exclude.clone(),
        exclude_patterns: cli.exclude_patterns.clone(),
    }
}

/// Combine file and command line; file synchronizations come first
pub fn assemble(cli: &Cli, file: &MirrorConfig) -> MirrorResult<RunSettings> {
    let options = file.options.clone().merge(cli_options(cli));
    ExclusionFilter::from_options(&options)?;

    let mut builder = SyncBuilder::new();
    file.apply_to(&mut builder)?;

    let sources = expand_sources(&cli.sources)?;
    let destinations = expand_destinations(&cli.destinations)?;
    if !sources.is_empty() && destinations.is_empty() {
        return Err(MirrorError::config(
            "sources were given without any destination",
        ));
    }
    builder.fan_out(&sources, &destinations)?;

    for group in &cli.mirrors {
        builder.mirror(group)?;
    }

    Ok(RunSettings {
        syncs: builder.build()?,
        options,
        watch: cli.watch,
    })
}

fn glob_paths(pattern: &str) -> MirrorResult<Vec<String>> {
    let mut matches = Vec::new();
    for entry in glob::glob(pattern)? {
        match entry {
            Ok(path) => matches.push(path.to_string_lossy().into_owned()),
            Err(e) => warn!("Skipping unreadable match of {}: {}", pattern, e),
        }
    }
    Ok(matches)
}

/// Expand source patterns to existing directories.
///
/// A pattern that matches nothing contributes nothing. The merge marker of a
/// pattern is carried over to each of its matches.
pub fn expand_sources(patterns: &[String]) -> MirrorResult<Vec<String>> {
    let mut sources = Vec::new();
    for pattern in patterns {
        let marked = has_merge_marker(pattern);
        let bare = pattern.trim_end_matches(|c: char| c == MERGE_MARKER || c == std::path::MAIN_SEPARATOR);
        let bare = if bare.is_empty() { pattern.as_str() } else { bare };

        let matches: Vec<String> = glob_paths(bare)?
            .into_iter()
            .filter(|path| Path::new(path).is_dir())
            .collect();
        if matches.is_empty() {
            eprintln!(
                "{}",
                format_warning(&format!("source pattern {} matched no directory", pattern))
            );
        }
        for path in matches {
            if marked {
                sources.push(format!("{}{}", path, MERGE_MARKER));
            } else {
                sources.push(path);
            }
        }
    }
    Ok(sources)
}

/// Expand destination patterns. A pattern that matches nothing is kept as is,
/// so destinations that do not exist yet can be named.
pub fn expand_destinations(patterns: &[String]) -> MirrorResult<Vec<String>> {
    let mut destinations = Vec::new();
    for pattern in patterns {
        let matches = glob_paths(pattern)?;
        if matches.is_empty() {
            destinations.push(pattern.clone());
        } else {
            destinations.extend(matches);
        }
    }
    Ok(destinations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("treemirror").chain(args.iter().copied()))
    }

    #[test]
    fn test_expand_sources_keeps_marker() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg-a")).unwrap();
        std::fs::create_dir_all(dir.path().join("pkg-b")).unwrap();
        std::fs::write(dir.path().join("pkg-file"), "x").unwrap();
        let base = dir.path().display().to_string();

        let nested = expand_sources(&[format!("{}/pkg-*", base)]).unwrap();
        assert_eq!(
            nested,
            vec![format!("{}/pkg-a", base), format!("{}/pkg-b", base)]
        );

        let merged = expand_sources(&[format!("{}/pkg-*/", base)]).unwrap();
        assert_eq!(
            merged,
            vec![format!("{}/pkg-a/", base), format!("{}/pkg-b/", base)]
        );

        assert!(expand_sources(&[format!("{}/missing-*", base)]).unwrap().is_empty());
    }

    #[test]
    fn test_expand_destinations_keeps_literal() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out1")).unwrap();
        let base = dir.path().display().to_string();

        let destinations =
            expand_destinations(&[format!("{}/out*", base), format!("{}/fresh", base)]).unwrap();
        assert_eq!(
            destinations,
            vec![format!("{}/out1", base), format!("{}/fresh", base)]
        );
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(matches!(
            expand_destinations(&["[".to_string()]),
            Err(MirrorError::Pattern(_))
        ));
    }

    #[test]
    fn test_assemble_from_command_line() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let out = dir.path().join("out");
        let other = dir.path().join("other");

        let cli = parse(&[
            "-s",
            &src.display().to_string(),
            "-d",
            &out.display().to_string(),
            "-m",
            &format!("{}/:{}", src.display(), other.display()),
            "-k",
            "-e",
            "node_modules",
        ]);
        let settings = assemble(&cli, &MirrorConfig::default()).unwrap();
        assert_eq!(settings.syncs.len(), 2);
        assert!(!settings.syncs[0].is_merge());
        assert!(settings.syncs[1].is_merge());
        assert!(settings.options.keep);
        assert_eq!(settings.options.exclude, vec!["node_modules".to_string()]);
        assert!(!settings.watch);
    }

    #[test]
    fn test_file_syncs_come_first_and_flags_combine() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let file = MirrorConfig::parse(&format!(
            "verbose = true\nexclude = [\"tmp\"]\n\n[[sync]]\nsources = [\"{}\"]\ndestinations = [\"{}\"]\nmerge = true\n",
            dir.path().join("a").display(),
            out.display()
        ))
        .unwrap();

        let cli = parse(&[
            "-m",
            &format!("{}:{}", dir.path().join("b").display(), dir.path().join("other").display()),
            "-e",
            "cache",
            "-w",
        ]);
        let settings = assemble(&cli, &file).unwrap();
        assert_eq!(settings.syncs[0].destinations(), &[out]);
        assert_eq!(settings.syncs.len(), 2);
        assert!(settings.options.verbose);
        assert_eq!(
            settings.options.exclude,
            vec!["tmp".to_string(), "cache".to_string()]
        );
        assert!(settings.watch);
        assert_eq!(logging_for(&cli, &file).0, LogLevel::Debug);
    }

    #[test]
    fn test_sources_without_destination_rejected() {
        let dir = tempdir().unwrap();
        let cli = parse(&["-s", &dir.path().display().to_string()]);
        let err = assemble(&cli, &MirrorConfig::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_configuration_rejected() {
        let err = assemble(&parse(&[]), &MirrorConfig::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_log_format_flag() {
        let cli = parse(&["--log-format", "json"]);
        assert_eq!(logging_for(&cli, &MirrorConfig::default()).1, LogFormat::Json);
        assert_eq!(
            logging_for(&parse(&[]), &MirrorConfig::default()),
            (LogLevel::Info, LogFormat::Text)
        );
    }
}
