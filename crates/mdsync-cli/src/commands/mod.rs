//! Command handlers

pub mod config;
pub mod convert;
pub mod prune;
pub mod status;
pub mod sync;
pub mod watch;

use anyhow::{Context, Result};

use mdsync_core::{Config, Ledger, NotionClient, Reconciler, Syncer};

/// Build a syncer against the configured Notion database
pub fn open_syncer(config: &Config) -> Result<Syncer<NotionClient>> {
    let client = NotionClient::new(config.notion_settings()?)
        .context("Failed to create Notion client")?;
    let ledger = Ledger::open(config.ledger_path()).context("Failed to open sync ledger")?;

    Ok(Syncer::new(
        Reconciler::new(client, config.reconcile_options()),
        ledger,
        &config.notes_dir,
        config.convert_mode(),
    ))
}
