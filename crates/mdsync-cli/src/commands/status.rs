//! Status command handler

use anyhow::{Context, Result};

use mdsync_core::{scan_markdown, Config, Ledger};

use crate::output::{Output, OutputFormat};

/// Show configuration and ledger state
pub fn show(config: &Config, output: &Output) -> Result<()> {
    let ledger = Ledger::open(config.ledger_path()).context("Failed to open sync ledger")?;
    let files = if config.notes_dir.is_dir() {
        scan_markdown(&config.notes_dir)?
    } else {
        Vec::new()
    };

    let pending: Vec<&str> = files
        .iter()
        .filter(|f| ledger.needs_sync(&f.relative, f.modified))
        .map(|f| f.relative.as_str())
        .collect();
    let last_sync = ledger
        .entries()
        .map(|(_, entry)| entry.last_synced_timestamp)
        .max();
    let remote_ready = config.validate_remote().is_ok();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "notes_dir": config.notes_dir,
                    "database_id": config.database_id,
                    "remote_configured": remote_ready,
                    "ledger": config.ledger_path(),
                    "files": files.len(),
                    "tracked": ledger.len(),
                    "pending": pending,
                    "last_sync": last_sync,
                })
            );
        }
        OutputFormat::Quiet => {
            for path in &pending {
                println!("{}", path);
            }
        }
        OutputFormat::Human => {
            println!("mdsync Status");
            println!("=============");
            println!();
            println!("Notes:");
            println!("  Directory: {}", config.notes_dir.display());
            println!("  Files:     {}", files.len());
            println!("  Pending:   {}", pending.len());
            println!();
            println!("Remote:");
            println!(
                "  Database:  {}",
                config.database_id.as_deref().unwrap_or("(not set)")
            );
            println!(
                "  Token:     {}",
                if config.notion_token.is_some() {
                    "set"
                } else {
                    "(not set)"
                }
            );
            println!();
            println!("Ledger:");
            println!("  Location:  {}", config.ledger_path().display());
            println!("  Tracked:   {}", ledger.len());
            println!(
                "  Last sync: {}",
                last_sync
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            if !pending.is_empty() {
                println!();
                println!("Pending files:");
                for path in &pending {
                    println!("  {}", path);
                }
            }
        }
    }

    Ok(())
}
