//! Sync-state ledger
//!
//! Remembers when each file was last synchronized so unchanged files can be
//! skipped. The ledger only caches timestamps; remote identity is always
//! looked up fresh by slug.
//!
//! Stored as a single JSON object keyed by path relative to the notes
//! directory, rewritten after every processed document.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// What the ledger remembers about one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub last_synced_timestamp: DateTime<Utc>,
    pub slug: String,
    pub title: String,
}

/// Persistent map of relative path to last sync
#[derive(Debug, Default)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
    /// Path to persist state
    path: Option<PathBuf>,
}

impl Ledger {
    /// Create an in-memory ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a ledger backed by a file
    ///
    /// A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(json) if json.trim().is_empty() => BTreeMap::new(),
            Ok(json) => serde_json::from_str(&json).map_err(|e| SyncError::Ledger {
                path: path.clone(),
                details: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(SyncError::from_io(e, path)),
        };

        Ok(Self {
            entries,
            path: Some(path),
        })
    }

    /// Look up a file's entry
    pub fn get(&self, relative: &str) -> Option<&LedgerEntry> {
        self.entries.get(relative)
    }

    /// Whether a file modified at `modified` has changes not yet synced
    pub fn needs_sync(&self, relative: &str, modified: DateTime<Utc>) -> bool {
        match self.entries.get(relative) {
            Some(entry) => modified > entry.last_synced_timestamp,
            None => true,
        }
    }

    /// Record a successful sync
    pub fn record(&mut self, relative: impl Into<String>, entry: LedgerEntry) {
        self.entries.insert(relative.into(), entry);
    }

    /// Forget a file
    pub fn remove(&mut self, relative: &str) -> Option<LedgerEntry> {
        self.entries.remove(relative)
    }

    /// Tracked relative paths, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Tracked files with their entries, sorted by path
    pub fn entries(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist to disk (no-op for in-memory ledgers)
    pub fn save(&self) -> SyncResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(&self.entries)?;
        atomic_write(path, &json)
    }
}

/// Write via a temp file and rename so the ledger is never half-written
fn atomic_write(path: &Path, data: &[u8]) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::from_io(e, parent))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path).map_err(|e| SyncError::from_io(e, &temp_path))?;
    file.write_all(data)
        .map_err(|e| SyncError::from_io(e, &temp_path))?;
    file.sync_all()
        .map_err(|e| SyncError::from_io(e, &temp_path))?;

    fs::rename(&temp_path, path).map_err(|e| SyncError::from_io(e, path))?;
    Ok(())
}
