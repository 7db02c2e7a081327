//! Per-run synchronization pipeline
//!
//! scan -> front matter -> convert -> reconcile -> ledger, one document at a
//! time in list order. A failing document is logged and counted; only a
//! fatal store error ends the run early.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::document::{ConvertMode, Document};
use crate::error::{SyncError, SyncResult};
use crate::ledger::{Ledger, LedgerEntry};
use crate::notion::{RecordStore, RemoteRecord};
use crate::reconcile::{RecordRef, Reconciler};
use crate::retry::retry;
use crate::scan::SourceFile;

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Synced(RecordRef),
    /// Unchanged since the last sync
    Skipped,
}

/// A document that could not be synchronized
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Counts for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailedFile>,
}

/// Drives files through conversion and upsert
pub struct Syncer<S> {
    reconciler: Reconciler<S>,
    ledger: Ledger,
    notes_dir: PathBuf,
    mode: ConvertMode,
}

impl<S: RecordStore> Syncer<S> {
    pub fn new(
        reconciler: Reconciler<S>,
        ledger: Ledger,
        notes_dir: impl Into<PathBuf>,
        mode: ConvertMode,
    ) -> Self {
        Self {
            reconciler,
            ledger,
            notes_dir: notes_dir.into(),
            mode,
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    /// Read and convert a file
    pub fn load_document(&self, file: &SourceFile) -> SyncResult<Document> {
        let text =
            std::fs::read_to_string(&file.path).map_err(|e| SyncError::from_io(e, &file.path))?;
        Document::from_source(&text, &file.stem(), self.mode)
    }

    /// Verify the store is reachable with the configured credentials
    pub async fn check_access(&self) -> SyncResult<()> {
        retry(&self.reconciler.options().retry, "check access", || {
            self.reconciler.store().check_access()
        })
        .await
    }

    /// Synchronize one file, skipping it when the ledger says it is current
    pub async fn sync_file(&mut self, file: &SourceFile, force: bool) -> SyncResult<FileOutcome> {
        self.sync_claimed(file, force, &mut HashMap::new()).await
    }

    /// Synchronize one file whose slug must not be in `claimed`
    ///
    /// `claimed` maps each slug already used in this run to its file.
    async fn sync_claimed(
        &mut self,
        file: &SourceFile,
        force: bool,
        claimed: &mut HashMap<String, String>,
    ) -> SyncResult<FileOutcome> {
        if !force && !self.ledger.needs_sync(&file.relative, file.modified) {
            if let Some(entry) = self.ledger.get(&file.relative) {
                claimed
                    .entry(entry.slug.clone())
                    .or_insert_with(|| file.relative.clone());
            }
            debug!("Skipping unchanged {}", file.relative);
            return Ok(FileOutcome::Skipped);
        }

        // Taken before reading, so edits made mid-sync count as newer
        let started = Utc::now();
        let doc = self.load_document(file)?;
        if let Some(owner) = claimed.get(&doc.slug) {
            return Err(SyncError::Validation(format!(
                "slug '{}' of {} is already used by {}",
                doc.slug, file.relative, owner
            )));
        }
        claimed.insert(doc.slug.clone(), file.relative.clone());
        let record = self.reconciler.upsert(&doc).await?;

        self.ledger.record(
            file.relative.clone(),
            LedgerEntry {
                last_synced_timestamp: started,
                slug: doc.slug,
                title: doc.title,
            },
        );
        self.ledger.save()?;

        Ok(FileOutcome::Synced(record))
    }

    /// Synchronize the file at `path` (used by watch mode)
    pub async fn sync_path(&mut self, path: &Path, force: bool) -> SyncResult<FileOutcome> {
        let file = SourceFile::from_path(&self.notes_dir, path)?;
        self.sync_file(&file, force).await
    }

    /// Synchronize every file in order
    ///
    /// Returns `Err` only for a fatal error; per-document failures are
    /// counted in the summary.
    pub async fn run(&mut self, files: &[SourceFile], force: bool) -> SyncResult<RunSummary> {
        self.check_access().await?;

        let mut summary = RunSummary {
            total: files.len(),
            ..RunSummary::default()
        };

        let mut claimed = HashMap::new();
        for file in files {
            match self.sync_claimed(file, force, &mut claimed).await {
                Ok(FileOutcome::Synced(_)) => summary.synced += 1,
                Ok(FileOutcome::Skipped) => summary.skipped += 1,
                Err(e) if e.is_fatal() => {
                    error!("Aborting run at {}: {}", file.relative, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to sync {}: {}", file.path.display(), e);
                    summary.failed += 1;
                    summary.failures.push(FailedFile {
                        path: file.relative.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Sync finished: {} synced, {} skipped, {} failed",
            summary.synced, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Slugs of every local document
    ///
    /// Any unreadable document is an error: pruning against a partial slug
    /// set would archive live records.
    pub fn local_slugs(&self, files: &[SourceFile]) -> SyncResult<HashSet<String>> {
        files
            .iter()
            .map(|file| self.load_document(file).map(|doc| doc.slug))
            .collect()
    }

    /// Managed records with no local file, without touching them
    pub async fn stale_records(&self, files: &[SourceFile]) -> SyncResult<Vec<RemoteRecord>> {
        let slugs = self.local_slugs(files)?;
        self.reconciler.find_stale(&slugs).await
    }

    /// Archive managed records with no local file and forget deleted paths
    pub async fn prune(&mut self, files: &[SourceFile]) -> SyncResult<Vec<RemoteRecord>> {
        let slugs = self.local_slugs(files)?;
        let archived = self.reconciler.prune(&slugs).await?;

        let present: HashSet<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        let gone: Vec<String> = self
            .ledger
            .paths()
            .filter(|path| !present.contains(path))
            .map(str::to_string)
            .collect();
        for path in &gone {
            self.ledger.remove(path);
        }
        if !gone.is_empty() {
            self.ledger.save()?;
        }

        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Block;
    use crate::notion::{MemoryStore, Properties, RecordId};
    use crate::reconcile::{PropertyMap, ReconcileOptions};
    use crate::retry::RetryPolicy;
    use crate::scan::scan_markdown;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    fn options() -> ReconcileOptions {
        ReconcileOptions {
            properties: PropertyMap {
                managed: Some("Managed".to_string()),
                ..PropertyMap::default()
            },
            retry: RetryPolicy::none(),
            ..ReconcileOptions::default()
        }
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, MemoryStore, Syncer<MemoryStore>) {
        let dir = TempDir::new().unwrap();
        let notes = dir.path().join("notes");
        fs::create_dir_all(&notes).unwrap();
        for (name, content) in files {
            let path = notes.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }

        let store = MemoryStore::new();
        let ledger = Ledger::open(dir.path().join("state").join("sync-state.json")).unwrap();
        let syncer = Syncer::new(
            Reconciler::new(store.clone(), options()),
            ledger,
            notes,
            ConvertMode::ContentOnly,
        );
        (dir, store, syncer)
    }

    #[tokio::test]
    async fn test_run_syncs_then_skips() {
        let (dir, store, mut syncer) = setup(&[
            ("a.md", "---\ntitle: Alpha\n---\nhello"),
            ("sub/b.md", "# Beta\n\nworld"),
        ]);
        let files = scan_markdown(syncer.notes_dir()).unwrap();

        let summary = syncer.run(&files, false).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(store.records().len(), 2);

        // Ledger was persisted
        let reopened = Ledger::open(dir.path().join("state").join("sync-state.json")).unwrap();
        assert_eq!(reopened.get("sub/b.md").unwrap().slug, "b");
        assert_eq!(reopened.get("a.md").unwrap().title, "Alpha");

        let summary = syncer.run(&files, false).await.unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.synced, 0);

        let summary = syncer.run(&files, true).await.unwrap();
        assert_eq!(summary.synced, 2);
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_modified_file_is_resynced() {
        let (_dir, store, mut syncer) = setup(&[("a.md", "first")]);
        let mut files = scan_markdown(syncer.notes_dir()).unwrap();
        syncer.run(&files, false).await.unwrap();

        fs::write(&files[0].path, "second").unwrap();
        files[0].modified = Utc::now() + chrono::Duration::seconds(60);

        let summary = syncer.run(&files, false).await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(store.records()[0].blocks(), vec![Block::paragraph("second")]);
    }

    #[tokio::test]
    async fn test_bad_document_does_not_stop_run() {
        let (_dir, store, mut syncer) = setup(&[
            ("a.md", "---\ntitle: [unclosed\n---\nbody"),
            ("b.md", "fine"),
        ]);
        let files = scan_markdown(syncer.notes_dir()).unwrap();

        let summary = syncer.run(&files, false).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.failures[0].path, "a.md");
        assert_eq!(store.records().len(), 1);
        assert!(syncer.ledger().get("a.md").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_fails_later_file() {
        let (_dir, store, mut syncer) = setup(&[
            ("a.md", "top-level content"),
            ("sub/a.md", "nested content"),
        ]);
        let files = scan_markdown(syncer.notes_dir()).unwrap();

        let summary = syncer.run(&files, false).await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].path, "sub/a.md");
        assert!(summary.failures[0].error.contains("already used by a.md"));

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].blocks(), vec![Block::paragraph("top-level content")]);
        assert!(syncer.ledger().get("sub/a.md").is_none());

        // An unchanged owner still claims its slug
        let summary = syncer.run(&files, false).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.records()[0].blocks(), vec![Block::paragraph("top-level content")]);
    }

    #[tokio::test]
    async fn test_sync_path() {
        let (_dir, store, mut syncer) = setup(&[("note.md", "text")]);
        let path = syncer.notes_dir().join("note.md");

        let outcome = syncer.sync_path(&path, false).await.unwrap();
        assert!(matches!(outcome, FileOutcome::Synced(RecordRef { created: true, .. })));
        assert_eq!(store.records().len(), 1);

        let missing = syncer.notes_dir().join("gone.md");
        let err = syncer.sync_path(&missing, false).await.unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
    }

    #[tokio::test]
    async fn test_prune_after_delete() {
        let (_dir, store, mut syncer) = setup(&[("keep.md", "k"), ("drop.md", "d")]);
        let files = scan_markdown(syncer.notes_dir()).unwrap();
        syncer.run(&files, false).await.unwrap();

        fs::remove_file(syncer.notes_dir().join("drop.md")).unwrap();
        let files = scan_markdown(syncer.notes_dir()).unwrap();

        let stale = syncer.stale_records(&files).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key.as_deref(), Some("drop"));

        let archived = syncer.prune(&files).await.unwrap();
        assert_eq!(archived.len(), 1);
        assert!(store.record(&archived[0].id).unwrap().archived);
        assert!(syncer.ledger().get("drop.md").is_none());
        assert!(syncer.ledger().get("keep.md").is_some());
    }

    /// Store that rejects every call as unauthorized
    struct Unauthorized;

    fn denied<T>() -> SyncResult<T> {
        Err(SyncError::Permanent("API token is invalid".to_string()))
    }

    #[async_trait]
    impl RecordStore for Unauthorized {
        async fn check_access(&self) -> SyncResult<()> {
            denied()
        }
        async fn query_equals(&self, _: &str, _: &str) -> SyncResult<Vec<RecordId>> {
            denied()
        }
        async fn list_flagged(&self, _: &str, _: &str) -> SyncResult<Vec<RemoteRecord>> {
            denied()
        }
        async fn create_record(&self, _: &Properties, _: &[Block]) -> SyncResult<RecordId> {
            denied()
        }
        async fn update_properties(&self, _: &str, _: &Properties) -> SyncResult<()> {
            denied()
        }
        async fn list_children(&self, _: &str) -> SyncResult<Vec<RecordId>> {
            denied()
        }
        async fn delete_block(&self, _: &str) -> SyncResult<()> {
            denied()
        }
        async fn append_children(&self, _: &str, _: &[Block]) -> SyncResult<()> {
            denied()
        }
        async fn archive_record(&self, _: &str) -> SyncResult<()> {
            denied()
        }
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_run() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "x").unwrap();
        let files = scan_markdown(dir.path()).unwrap();

        let mut syncer = Syncer::new(
            Reconciler::new(Unauthorized, options()),
            Ledger::new(),
            dir.path(),
            ConvertMode::ContentOnly,
        );
        let err = syncer.run(&files, false).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
