//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use mdsync_core::notion::RemoteRecord;
use mdsync_core::{Block, Document, RunSummary};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print the result of a sync run
    pub fn print_summary(&self, summary: &RunSummary) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "{} file(s): {} synced, {} unchanged, {} failed",
                    summary.total, summary.synced, summary.skipped, summary.failed
                );
                for failure in &summary.failures {
                    println!("  ✗ {}: {}", failure.path, failure.error);
                }
            }
            OutputFormat::Json => print_json(summary),
            OutputFormat::Quiet => {
                for failure in &summary.failures {
                    println!("{}", failure.path);
                }
            }
        }
    }

    /// Print records that were (or would be) archived
    pub fn print_records(&self, records: &[RemoteRecord], verb: &str) {
        match self.format {
            OutputFormat::Human => {
                if records.is_empty() {
                    println!("No stale records.");
                    return;
                }
                for record in records {
                    println!(
                        "{} {} ({})",
                        verb,
                        record.key.as_deref().unwrap_or("(no slug)"),
                        record.id
                    );
                }
                println!("\n{} record(s)", records.len());
            }
            OutputFormat::Json => print_json(&records),
            OutputFormat::Quiet => {
                for record in records {
                    println!("{}", record.id);
                }
            }
        }
    }

    /// Print a converted document
    pub fn print_document(&self, doc: &Document) {
        match self.format {
            OutputFormat::Human => {
                println!("Title: {}", doc.title);
                println!("Slug:  {}", doc.slug);
                println!();
                for block in &doc.blocks {
                    println!("{}", describe_block(block));
                }
                println!("\n{} block(s)", doc.blocks.len());
            }
            OutputFormat::Json => print_json(doc),
            OutputFormat::Quiet => println!("{}", doc.slug),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Pretty-print any serializable value as JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON output: {}", e),
    }
}

/// One-line summary of a block
fn describe_block(block: &Block) -> String {
    let label = match block {
        Block::Heading { level, .. } => format!("h{}", level),
        Block::Code { language, .. } => format!("code[{}]", language),
        Block::Todo { checked: true, .. } => "todo[x]".to_string(),
        Block::Todo { checked: false, .. } => "todo[ ]".to_string(),
        other => other.kind().to_string(),
    };

    match block.text() {
        Some(text) if !text.is_empty() => {
            format!("{:<14} {}", label, truncate_line(text, 60))
        }
        _ => match block {
            Block::Image { url, .. } => format!("{:<14} {}", label, truncate(url, 60)),
            _ => label,
        },
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
