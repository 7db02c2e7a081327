//! Sync command handler

use anyhow::{bail, Context, Result};

use mdsync_core::{scan_markdown, Config, Ledger, MemoryStore, Reconciler, Syncer};

use super::open_syncer;
use crate::output::Output;

/// Flags of `mdsync sync`
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncArgs {
    /// Ignore the ledger and upsert every file
    pub force: bool,
    /// Archive managed records without a local file afterwards
    pub prune: bool,
    /// Convert and reconcile against an in-memory store only
    pub dry_run: bool,
}

/// Sync the notes directory into the configured database
pub async fn sync(config: &Config, args: SyncArgs, output: &Output) -> Result<()> {
    let files = scan_markdown(&config.notes_dir).context("Failed to scan notes directory")?;

    if args.dry_run {
        return dry_run(config, &files, args.prune, output).await;
    }

    let mut syncer = open_syncer(config)?;
    output.message(&format!(
        "Syncing {} file(s) from {}...",
        files.len(),
        config.notes_dir.display()
    ));

    let summary = syncer.run(&files, args.force).await?;
    output.print_summary(&summary);

    if summary.failed > 0 {
        if args.prune {
            output.message("Skipping prune because some documents failed");
        }
        bail!("{} document(s) failed to sync", summary.failed);
    }

    if args.prune {
        let archived = syncer.prune(&files).await.context("Prune failed")?;
        output.print_records(&archived, "Archived");
    }

    Ok(())
}

/// Run the pipeline against a throwaway store
async fn dry_run(
    config: &Config,
    files: &[mdsync_core::SourceFile],
    prune: bool,
    output: &Output,
) -> Result<()> {
    let mut syncer = Syncer::new(
        Reconciler::new(MemoryStore::new(), config.reconcile_options()),
        Ledger::new(),
        &config.notes_dir,
        config.convert_mode(),
    );

    output.message(&format!(
        "Dry run: converting {} file(s) from {}",
        files.len(),
        config.notes_dir.display()
    ));
    let summary = syncer.run(files, true).await?;
    output.print_summary(&summary);

    if prune {
        output.message("Prune needs the remote database; use `mdsync prune --dry-run`");
    }
    if summary.failed > 0 {
        bail!("{} document(s) failed to convert", summary.failed);
    }
    Ok(())
}
