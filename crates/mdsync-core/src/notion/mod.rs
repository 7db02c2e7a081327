//! Remote record store
//!
//! The reconciler talks to the store only through [`RecordStore`]. Two
//! implementations ship with the crate:
//!
//! - [`NotionClient`]: the Notion REST API over `reqwest`
//! - [`MemoryStore`]: an in-process store for dry runs and tests
//!
//! ## Usage
//!
//! ```ignore
//! let client = NotionClient::new(config.notion_settings()?)?;
//! client.check_access().await?;
//! let ids = client.query_equals("Slug", "my-post").await?;
//! ```

mod blocks;
mod client;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::SyncResult;
use crate::models::Block;

pub use blocks::{block_to_json, notion_language, properties_to_json, MAX_TEXT_LENGTH};
pub use client::{NotionClient, NotionSettings, DEFAULT_API_BASE_URL, DEFAULT_NOTION_VERSION};
pub use memory::{MemoryRecord, MemoryStore};

/// Store-assigned identifier of a record or block
pub type RecordId = String;

/// A property value in the store's vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    /// ISO 8601 date or datetime
    Date(String),
    Select(String),
    MultiSelect(Vec<String>),
    Checkbox(bool),
    /// Already-structured value passed through unchanged
    Raw(Value),
}

/// Property name to value
pub type Properties = BTreeMap<String, PropertyValue>;

/// A record returned by a collection scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    /// Value of the key property, if the record has one
    pub key: Option<String>,
}

/// Query and mutation interface of the remote record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Verify credentials and that the target collection exists
    async fn check_access(&self) -> SyncResult<()>;

    /// Records whose text `property` equals `value`
    async fn query_equals(&self, property: &str, value: &str) -> SyncResult<Vec<RecordId>>;

    /// Records whose checkbox `flag_property` is set, with their `key_property`
    async fn list_flagged(
        &self,
        flag_property: &str,
        key_property: &str,
    ) -> SyncResult<Vec<RemoteRecord>>;

    /// Create a record in the configured collection
    ///
    /// `children` must not exceed the store's per-call block ceiling.
    async fn create_record(
        &self,
        properties: &Properties,
        children: &[Block],
    ) -> SyncResult<RecordId>;

    /// Overwrite the given properties of a record
    async fn update_properties(&self, id: &str, properties: &Properties) -> SyncResult<()>;

    /// IDs of the record's direct children, in order
    async fn list_children(&self, id: &str) -> SyncResult<Vec<RecordId>>;

    /// Delete one child block
    async fn delete_block(&self, block_id: &str) -> SyncResult<()>;

    /// Append children after the existing ones
    ///
    /// `children` must not exceed the store's per-call block ceiling.
    async fn append_children(&self, id: &str, children: &[Block]) -> SyncResult<()>;

    /// Soft-delete a record
    async fn archive_record(&self, id: &str) -> SyncResult<()>;
}
