use std::sync::Arc;

use tracing::info;
use treemirror_core::{LocalFs, MirrorError, MirrorResult};
use treemirror_watch::{watch_directories, NotifyService};

use crate::output::format_info;
use crate::setup::RunSettings;

/// Mirror continuously until interrupted
pub async fn execute(settings: &RunSettings) -> MirrorResult<()> {
    let handle = watch_directories(
        &settings.syncs,
        &settings.options,
        Arc::new(NotifyService::new()),
        Arc::new(LocalFs),
    )
    .await?;

    eprintln!(
        "{}",
        format_info(&format!(
            "Watching {} source root(s), press Ctrl-C to stop",
            handle.roots().len()
        ))
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| MirrorError::watch(format!("failed to listen for Ctrl-C: {}", e)))?;

    let stats = handle.stats();
    handle.stop().await?;
    info!(
        "Applied {} operation(s), {} failed",
        stats.applied, stats.failed
    );
    Ok(())
}
