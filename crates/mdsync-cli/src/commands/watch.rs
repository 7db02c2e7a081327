//! Watch command handler

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use mdsync_core::{scan_markdown, sync_queue, watch_markdown, Config, FileOutcome};

use super::open_syncer;
use crate::output::Output;

/// Distinct files that may wait for the worker at once
const QUEUE_CAPACITY: usize = 256;

/// Sync once, then keep syncing files as they change
pub async fn watch(config: &Config, force: bool, output: &Output) -> Result<()> {
    let mut syncer = open_syncer(config)?;

    let files = scan_markdown(&config.notes_dir).context("Failed to scan notes directory")?;
    let summary = syncer.run(&files, force).await?;
    output.print_summary(&summary);

    let (queue, mut receiver) = sync_queue(QUEUE_CAPACITY);
    let _watcher = watch_markdown(&config.notes_dir, queue).context("Failed to start watcher")?;
    let debounce = Duration::from_millis(config.watch_debounce_ms);

    output.message(&format!(
        "Watching {} for changes (Ctrl-C to stop)",
        config.notes_dir.display()
    ));

    loop {
        tokio::select! {
            next = receiver.recv_debounced(debounce) => {
                let Some(path) = next else { break };
                match syncer.sync_path(&path, false).await {
                    Ok(FileOutcome::Synced(record)) => {
                        output.success(&format!("Synced {} -> {}", path.display(), record.id));
                    }
                    Ok(FileOutcome::Skipped) => {}
                    Err(e) if e.is_fatal() => {
                        return Err(e).context("Watch stopped");
                    }
                    Err(e) => {
                        error!("Failed to sync {}: {}", path.display(), e);
                        output.message(&format!("✗ {}: {}", path.display(), e));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping watcher");
                break;
            }
        }
    }

    output.message("Stopped watching");
    Ok(())
}
