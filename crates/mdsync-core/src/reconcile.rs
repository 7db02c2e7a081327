//! Idempotent upsert of documents into the record store
//!
//! ## Protocol
//!
//! 1. Query the store for the record whose slug property equals the
//!    document's slug (first match wins)
//! 2. Found: overwrite its properties, delete every child block, append the
//!    new blocks in batches
//! 3. Not found: create the record with the first batch of blocks and
//!    append the rest
//!
//! The store has no atomic "replace children", so a reader can observe an
//! empty record between the delete and the append. The next successful run
//! always converges.
//!
//! Remote field names come from an explicit [`PropertyMap`]; nothing is
//! guessed from the store's schema.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{SyncError, SyncResult};
use crate::frontmatter::{list_field, text_field};
use crate::models::Block;
use crate::notion::{Properties, PropertyValue, RecordId, RecordStore, RemoteRecord};
use crate::retry::{retry, RetryPolicy};

/// Front-matter keys with a dedicated role; never passed through
const RESERVED_FIELDS: &[&str] = &["title", "slug", "date", "tags", "status", "type", "author"];

/// Safe number of blocks per create/append call
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Hard per-call block ceiling of the store
pub const MAX_BATCH_SIZE: usize = 100;

/// Which remote field plays which role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMap {
    #[serde(default = "default_title_property")]
    pub title: String,
    #[serde(default = "default_slug_property")]
    pub slug: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    /// Checkbox marking records owned by this tool (required for prune)
    #[serde(default)]
    pub managed: Option<String>,
    /// Allowed values of the status select; empty accepts anything
    #[serde(default)]
    pub status_options: Vec<String>,
    /// Allowed values of the type select; empty accepts anything
    #[serde(default)]
    pub kind_options: Vec<String>,
}

fn default_title_property() -> String {
    "Name".to_string()
}

fn default_slug_property() -> String {
    "Slug".to_string()
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self {
            title: default_title_property(),
            slug: default_slug_property(),
            date: None,
            tags: None,
            status: None,
            kind: None,
            author: None,
            managed: None,
            status_options: Vec::new(),
            kind_options: Vec::new(),
        }
    }
}

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub properties: PropertyMap,
    pub batch_size: usize,
    pub pass_through_unknown: bool,
    pub retry: RetryPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            properties: PropertyMap::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            pass_through_unknown: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRef {
    pub id: RecordId,
    /// Whether the record was created by this call
    pub created: bool,
}

/// Creates or replaces remote records keyed by slug
pub struct Reconciler<S> {
    store: S,
    options: ReconcileOptions,
    /// One async lock per slug, held across query-then-mutate
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: S, options: ReconcileOptions) -> Self {
        Self {
            store,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    fn batch_size(&self) -> usize {
        self.options.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn slug_lock(&self, slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(slug.to_string()).or_default().clone()
    }

    /// Create or update the record for `doc`
    pub async fn upsert(&self, doc: &Document) -> SyncResult<RecordRef> {
        if doc.title.trim().is_empty() {
            return Err(SyncError::Validation("document has no title".to_string()));
        }
        if doc.slug.trim().is_empty() {
            return Err(SyncError::Validation(format!(
                "document '{}' has no slug",
                doc.title
            )));
        }

        let lock = self.slug_lock(&doc.slug);
        let result = {
            let _guard = lock.lock().await;
            self.upsert_locked(doc).await
        };
        self.release_lock(&doc.slug, lock);
        result
    }

    /// Drop the slug's lock entry once no other upsert holds or awaits it
    fn release_lock(&self, slug: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(lock);
        if locks.get(slug).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(slug);
        }
    }

    async fn upsert_locked(&self, doc: &Document) -> SyncResult<RecordRef> {
        let policy = &self.options.retry;
        let slug_property = &self.options.properties.slug;
        let role_properties = self.role_properties(doc);
        let properties = self.with_pass_through(doc, role_properties.clone());
        let has_pass_through = properties.len() > role_properties.len();

        let matches = retry(policy, "query record", || {
            self.store.query_equals(slug_property, &doc.slug)
        })
        .await?;
        if matches.len() > 1 {
            warn!(
                "{} records share slug '{}'; updating the first",
                matches.len(),
                doc.slug
            );
        }

        match matches.into_iter().next() {
            Some(id) => {
                let updated = retry(policy, "update properties", || {
                    self.store.update_properties(&id, &properties)
                })
                .await;
                match updated {
                    Err(e) if has_pass_through && rejects_properties(&e) => {
                        warn!("{}; updating '{}' without pass-through properties", e, doc.slug);
                        retry(policy, "update properties", || {
                            self.store.update_properties(&id, &role_properties)
                        })
                        .await?;
                    }
                    other => other?,
                }
                self.replace_children(&id, &doc.blocks).await?;
                info!("Updated '{}' ({} blocks) -> {}", doc.slug, doc.blocks.len(), id);
                Ok(RecordRef { id, created: false })
            }
            None => {
                let split = doc.blocks.len().min(self.batch_size());
                let (first, rest) = doc.blocks.split_at(split);

                let created = retry(policy, "create record", || {
                    self.store.create_record(&properties, first)
                })
                .await;
                let id = match created {
                    Err(e) if has_pass_through && rejects_properties(&e) => {
                        warn!("{}; creating '{}' without pass-through properties", e, doc.slug);
                        retry(policy, "create record", || {
                            self.store.create_record(&role_properties, first)
                        })
                        .await?
                    }
                    other => other?,
                };
                self.append_batched(&id, rest).await?;
                info!("Created '{}' ({} blocks) -> {}", doc.slug, doc.blocks.len(), id);
                Ok(RecordRef { id, created: true })
            }
        }
    }

    async fn replace_children(&self, id: &str, blocks: &[Block]) -> SyncResult<()> {
        let policy = &self.options.retry;
        let children = retry(policy, "list children", || self.store.list_children(id)).await?;

        debug!("Deleting {} existing blocks from {}", children.len(), id);
        for child in &children {
            retry(policy, "delete block", || self.store.delete_block(child)).await?;
        }

        self.append_batched(id, blocks).await
    }

    async fn append_batched(&self, id: &str, blocks: &[Block]) -> SyncResult<()> {
        let policy = &self.options.retry;
        for batch in blocks.chunks(self.batch_size()) {
            debug!("Appending {} blocks to {}", batch.len(), id);
            retry(policy, "append blocks", || {
                self.store.append_children(id, batch)
            })
            .await?;
        }
        Ok(())
    }

    /// Map a document onto remote properties
    pub fn build_properties(&self, doc: &Document) -> Properties {
        self.with_pass_through(doc, self.role_properties(doc))
    }

    /// Properties of the configured roles only
    fn role_properties(&self, doc: &Document) -> Properties {
        let map = &self.options.properties;
        let meta = &doc.metadata;
        let mut props = Properties::new();

        props.insert(map.title.clone(), PropertyValue::Title(doc.title.clone()));
        props.insert(map.slug.clone(), PropertyValue::RichText(doc.slug.clone()));

        if let (Some(name), Some(raw)) = (&map.date, text_field(meta, "date")) {
            match normalize_date(&raw) {
                Some(date) => {
                    props.insert(name.clone(), PropertyValue::Date(date));
                }
                None => warn!("Ignoring unparseable date '{}' in '{}'", raw, doc.slug),
            }
        }

        if let Some(name) = &map.tags {
            props.insert(
                name.clone(),
                PropertyValue::MultiSelect(list_field(meta, "tags")),
            );
        }

        if let (Some(name), Some(value)) = (&map.status, text_field(meta, "status")) {
            let value = select_option(name, value, &map.status_options);
            props.insert(name.clone(), PropertyValue::Select(value));
        }

        if let (Some(name), Some(value)) = (&map.kind, text_field(meta, "type")) {
            let value = select_option(name, value, &map.kind_options);
            props.insert(name.clone(), PropertyValue::Select(value));
        }

        if let (Some(name), Some(author)) = (&map.author, text_field(meta, "author")) {
            props.insert(name.clone(), PropertyValue::RichText(author));
        }

        if let Some(name) = &map.managed {
            props.insert(name.clone(), PropertyValue::Checkbox(true));
        }

        props
    }

    /// Add unmapped front-matter fields to `props`, inferring their types
    fn with_pass_through(&self, doc: &Document, mut props: Properties) -> Properties {
        if self.options.pass_through_unknown {
            for (key, value) in &doc.metadata {
                if RESERVED_FIELDS.contains(&key.as_str()) || props.contains_key(key) {
                    continue;
                }
                if let Some(inferred) = infer_property(value) {
                    props.insert(key.clone(), inferred);
                }
            }
        }

        props
    }

    /// Managed records whose slug is not among `local_slugs`
    pub async fn find_stale(&self, local_slugs: &HashSet<String>) -> SyncResult<Vec<RemoteRecord>> {
        let map = &self.options.properties;
        let Some(ref flag) = map.managed else {
            return Err(SyncError::Validation(
                "pruning requires the `managed` property to be configured".to_string(),
            ));
        };

        let records = retry(&self.options.retry, "list managed records", || {
            self.store.list_flagged(flag, &map.slug)
        })
        .await?;

        Ok(records
            .into_iter()
            .filter(|record| match &record.key {
                Some(slug) => !local_slugs.contains(slug),
                None => {
                    debug!("Managed record {} has no slug; leaving it alone", record.id);
                    false
                }
            })
            .collect())
    }

    /// Archive managed records that no longer have a local file
    pub async fn prune(&self, local_slugs: &HashSet<String>) -> SyncResult<Vec<RemoteRecord>> {
        let stale = self.find_stale(local_slugs).await?;
        for record in &stale {
            retry(&self.options.retry, "archive record", || {
                self.store.archive_record(&record.id)
            })
            .await?;
            info!(
                "Archived '{}' ({})",
                record.key.as_deref().unwrap_or_default(),
                record.id
            );
        }
        Ok(stale)
    }
}

/// Keep a select value if allowed, else fall back to the first option
/// A 400 validation error, as returned for properties the collection lacks
fn rejects_properties(error: &SyncError) -> bool {
    matches!(
        error,
        SyncError::Rejected { status: 400, code, .. } if code == "validation_error"
    )
}

fn select_option(property: &str, value: String, allowed: &[String]) -> String {
    match allowed.first() {
        Some(fallback) if !allowed.contains(&value) => {
            let mismatch = SyncError::SchemaMismatch {
                property: property.to_string(),
                value,
            };
            warn!("{}; using '{}'", mismatch, fallback);
            fallback.clone()
        }
        _ => value,
    }
}

/// Best-effort property type for a pass-through front-matter value
fn infer_property(value: &Value) -> Option<PropertyValue> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(PropertyValue::MultiSelect(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        )),
        Value::Object(_) => Some(PropertyValue::Raw(value.clone())),
        Value::String(s) => Some(PropertyValue::RichText(s.clone())),
        Value::Number(n) => Some(PropertyValue::RichText(n.to_string())),
        Value::Bool(b) => Some(PropertyValue::RichText(b.to_string())),
    }
}

/// Normalize a front-matter date to ISO 8601
fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.to_rfc3339());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    None
}
