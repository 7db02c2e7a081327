//! Convert command handler

use std::path::Path;

use anyhow::{Context, Result};

use mdsync_core::notion::{block_to_json, properties_to_json};
use mdsync_core::{Config, ConvertMode, Document, MemoryStore, Reconciler};

use crate::output::{print_json, Output};

/// Show the blocks a single file converts to, without touching the store
pub fn convert(
    config: &Config,
    path: &Path,
    full_page: bool,
    notion: bool,
    output: &Output,
) -> Result<()> {
    let doc = load(path, full_page || config.full_page)?;

    if notion {
        // Exactly what would be sent on create
        let reconciler = Reconciler::new(MemoryStore::new(), config.reconcile_options());
        let blocks: Vec<_> = doc.blocks.iter().map(block_to_json).collect();
        print_json(&serde_json::json!({
            "properties": properties_to_json(&reconciler.build_properties(&doc)),
            "children": blocks,
        }));
        return Ok(());
    }

    output.print_document(&doc);
    Ok(())
}

fn load(path: &Path, full_page: bool) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mode = if full_page {
        ConvertMode::FullPage
    } else {
        ConvertMode::ContentOnly
    };

    Document::from_source(&text, &stem, mode)
        .with_context(|| format!("Failed to convert {}", path.display()))
}
