use std::sync::Arc;

use tracing::info;
use treemirror_core::{BulkMirror, LocalFs, MirrorResult};

use crate::output::format_success;
use crate::progress::ProgressManager;
use crate::setup::RunSettings;

/// Mirror every synchronization once
pub async fn execute(settings: &RunSettings) -> MirrorResult<()> {
    let engine = BulkMirror::new(Arc::new(LocalFs), settings.options.clone())?;

    let mut progress = ProgressManager::for_terminal(settings.options.verbose);
    progress.start_mirror(settings.syncs.len());

    match engine.run(&settings.syncs).await {
        Ok(()) => {
            let message = format!("mirrored {} synchronization(s)", settings.syncs.len());
            if progress.is_active() {
                progress.finish_mirror(&format_success(&message));
            } else {
                info!("Mirrored {} synchronization(s)", settings.syncs.len());
            }
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            Err(e)
        }
    }
}
