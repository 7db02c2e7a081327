//! mdsync Core Library
//!
//! This crate provides the core functionality for mdsync, which publishes a
//! directory of Markdown notes into a Notion database and keeps it there.
//!
//! # Architecture
//!
//! - **Converter**: Markdown body to a flat, ordered list of typed blocks
//! - **Reconciler**: idempotent upsert keyed by slug against a [`RecordStore`]
//! - **Ledger**: local sync timestamps so unchanged files are skipped
//!
//! Re-running a sync with unchanged files never creates duplicate records;
//! the remote store is always queried by slug before writing.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let client = NotionClient::new(config.notion_settings()?)?;
//! let reconciler = Reconciler::new(client, config.reconcile_options());
//! let ledger = Ledger::open(config.ledger_path())?;
//!
//! let mut syncer = Syncer::new(reconciler, ledger, &config.notes_dir, config.convert_mode());
//! let files = scan_markdown(&config.notes_dir)?;
//! let summary = syncer.run(&files, false).await?;
//! ```
//!
//! # Modules
//!
//! - `convert`: Markdown block converter
//! - `document`: Documents built from file text
//! - `reconcile`: Upsert reconciler and property mapping
//! - `notion`: Record store trait, Notion client, in-memory store
//! - `sync`: Per-run pipeline
//! - `queue` / `watch`: Watch mode
//! - `config`: Application configuration

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod frontmatter;
pub mod ledger;
pub mod models;
pub mod notion;
pub mod queue;
pub mod reconcile;
pub mod retry;
pub mod scan;
pub mod sync;
pub mod watch;

pub use config::Config;
pub use convert::{convert, ConvertContext};
pub use document::{ConvertMode, Document};
pub use error::{SyncError, SyncResult};
pub use ledger::{Ledger, LedgerEntry};
pub use models::{generate_slug, Block, InlineStyle};
pub use notion::{MemoryStore, NotionClient, RecordStore};
pub use queue::{sync_queue, SyncQueue, SyncQueueReceiver};
pub use reconcile::{PropertyMap, RecordRef, ReconcileOptions, Reconciler};
pub use retry::RetryPolicy;
pub use scan::{scan_markdown, SourceFile};
pub use sync::{FileOutcome, RunSummary, Syncer};
pub use watch::{watch_markdown, MarkdownWatcher};
