//! Command-line interface for treemirror.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use treemirror_core::{init_logging, LogFormat};

mod commands;
mod output;
mod progress;
mod setup;

pub use commands::*;
pub use output::*;
pub use progress::*;
pub use setup::*;

/// Mirror source directories into destinations, once or continuously
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Keep watching and mirror every change
    #[arg(short, long)]
    pub watch: bool,

    /// Log every event and filesystem mutation
    #[arg(short, long)]
    pub verbose: bool,

    /// Watch the enclosing project root instead of each source
    #[arg(short = 'p', long)]
    pub watch_project: bool,

    /// Do not clear destinations before mirroring
    #[arg(short, long)]
    pub keep: bool,

    /// Source directory glob; end it with / to merge its contents into each destination
    #[arg(short, long = "source", value_name = "GLOB")]
    pub sources: Vec<String>,

    /// Destination directory glob shared by every --source
    #[arg(short, long = "dest", value_name = "GLOB")]
    pub destinations: Vec<String>,

    /// Merge group SRC[,SRC..]:DEST; later sources win
    #[arg(short, long = "mirror", value_name = "SRC:DEST")]
    pub mirrors: Vec<String>,

    /// Relative path to leave out, with everything below it
    #[arg(short, long, value_name = "PATH")]
    pub exclude: Vec<String>,

    /// Glob matched against every prefix of a relative path
    #[arg(short = 'x', long = "exclude-pattern", value_name = "GLOB")]
    pub exclude_patterns: Vec<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// Run the CLI application
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with(cli).await
}

/// Run with already parsed arguments
pub async fn run_with(cli: Cli) -> Result<()> {
    let file = setup::load_file(&cli)?;
    let (level, format) = setup::logging_for(&cli, &file);
    init_logging(level, format);

    let settings = setup::assemble(&cli, &file)?;
    debug!("Running {} synchronization(s)", settings.syncs.len());
    for sync in &settings.syncs {
        debug!("{}", output::format_sync(sync));
    }

    if settings.watch {
        commands::execute_watch(&settings).await?;
    } else {
        commands::execute_mirror(&settings).await?;
    }

    Ok(())
}
