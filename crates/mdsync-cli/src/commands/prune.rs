//! Prune command handler

use anyhow::{Context, Result};

use mdsync_core::{scan_markdown, Config};

use super::open_syncer;
use crate::output::Output;

/// Archive managed records whose Markdown file is gone
pub async fn prune(config: &Config, dry_run: bool, output: &Output) -> Result<()> {
    let files = scan_markdown(&config.notes_dir).context("Failed to scan notes directory")?;
    let mut syncer = open_syncer(config)?;
    syncer.check_access().await?;

    if dry_run {
        let stale = syncer.stale_records(&files).await?;
        output.print_records(&stale, "Would archive");
    } else {
        let archived = syncer.prune(&files).await?;
        output.print_records(&archived, "Archived");
    }
    Ok(())
}
