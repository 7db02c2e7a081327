//! In-process record store
//!
//! Mirrors the Notion store's contract closely enough to exercise the
//! reconciler without a network: records live in a shared map, every call
//! is counted, and the block ceiling is enforced.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{Properties, PropertyValue, RecordId, RecordStore, RemoteRecord};
use crate::error::{SyncError, SyncResult};
use crate::models::Block;

/// Blocks accepted per create/append call
const BLOCK_CEILING: usize = 100;

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub properties: Properties,
    /// Children as (block id, block) in order
    pub children: Vec<(RecordId, Block)>,
    pub archived: bool,
}

impl MemoryRecord {
    /// Children without their IDs
    pub fn blocks(&self) -> Vec<Block> {
        self.children.iter().map(|(_, b)| b.clone()).collect()
    }

    fn text_property(&self, name: &str) -> Option<&str> {
        match self.properties.get(name)? {
            PropertyValue::RichText(s) | PropertyValue::Title(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<MemoryRecord>,
    calls: Vec<String>,
}

/// Shared in-memory store; clones see the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic in another test thread must not hide this store's contents
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every record, archived ones included
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.lock().records.clone()
    }

    /// Look up a record by ID
    pub fn record(&self, id: &str) -> Option<MemoryRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    /// Names of the store operations called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Insert a record directly, bypassing the call log
    pub fn seed(&self, properties: Properties, children: Vec<Block>) -> RecordId {
        let id = Uuid::new_v4().to_string();
        let record = MemoryRecord {
            id: id.clone(),
            properties,
            children: children
                .into_iter()
                .map(|b| (Uuid::new_v4().to_string(), b))
                .collect(),
            archived: false,
        };
        self.lock().records.push(record);
        id
    }

    fn check_ceiling(children: &[Block]) -> SyncResult<()> {
        if children.len() > BLOCK_CEILING {
            return Err(SyncError::Rejected {
                status: 400,
                code: "validation_error".to_string(),
                message: format!(
                    "body.children.length should be ≤ {}, instead was {}",
                    BLOCK_CEILING,
                    children.len()
                ),
            });
        }
        Ok(())
    }
}

fn not_found(id: &str) -> SyncError {
    SyncError::Rejected {
        status: 404,
        code: "object_not_found".to_string(),
        message: format!("Could not find block with ID: {}", id),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn check_access(&self) -> SyncResult<()> {
        self.lock().calls.push("check_access".to_string());
        Ok(())
    }

    async fn query_equals(&self, property: &str, value: &str) -> SyncResult<Vec<RecordId>> {
        let mut state = self.lock();
        state.calls.push("query".to_string());
        Ok(state
            .records
            .iter()
            .filter(|r| !r.archived && r.text_property(property) == Some(value))
            .map(|r| r.id.clone())
            .collect())
    }

    async fn list_flagged(
        &self,
        flag_property: &str,
        key_property: &str,
    ) -> SyncResult<Vec<RemoteRecord>> {
        let mut state = self.lock();
        state.calls.push("list_flagged".to_string());
        Ok(state
            .records
            .iter()
            .filter(|r| {
                !r.archived
                    && r.properties.get(flag_property) == Some(&PropertyValue::Checkbox(true))
            })
            .map(|r| RemoteRecord {
                id: r.id.clone(),
                key: r.text_property(key_property).map(str::to_string),
            })
            .collect())
    }

    async fn create_record(
        &self,
        properties: &Properties,
        children: &[Block],
    ) -> SyncResult<RecordId> {
        Self::check_ceiling(children)?;
        let mut state = self.lock();
        state.calls.push("create".to_string());

        let id = Uuid::new_v4().to_string();
        state.records.push(MemoryRecord {
            id: id.clone(),
            properties: properties.clone(),
            children: children
                .iter()
                .map(|b| (Uuid::new_v4().to_string(), b.clone()))
                .collect(),
            archived: false,
        });
        Ok(id)
    }

    async fn update_properties(&self, id: &str, properties: &Properties) -> SyncResult<()> {
        let mut state = self.lock();
        state.calls.push("update".to_string());
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(id))?;
        for (name, value) in properties {
            record.properties.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn list_children(&self, id: &str) -> SyncResult<Vec<RecordId>> {
        let mut state = self.lock();
        state.calls.push("list_children".to_string());
        let record = state
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(id))?;
        Ok(record.children.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn delete_block(&self, block_id: &str) -> SyncResult<()> {
        let mut state = self.lock();
        state.calls.push("delete".to_string());
        for record in state.records.iter_mut() {
            if let Some(pos) = record.children.iter().position(|(id, _)| id == block_id) {
                record.children.remove(pos);
                return Ok(());
            }
        }
        Err(not_found(block_id))
    }

    async fn append_children(&self, id: &str, children: &[Block]) -> SyncResult<()> {
        Self::check_ceiling(children)?;
        let mut state = self.lock();
        state.calls.push("append".to_string());
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(id))?;
        record.children.extend(
            children
                .iter()
                .map(|b| (Uuid::new_v4().to_string(), b.clone())),
        );
        Ok(())
    }

    async fn archive_record(&self, id: &str) -> SyncResult<()> {
        let mut state = self.lock();
        state.calls.push("archive".to_string());
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(id))?;
        record.archived = true;
        Ok(())
    }
}
