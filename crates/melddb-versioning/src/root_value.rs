//! Root values: the table-name → snapshot mapping owned by a commit.
//!
//! A root value is immutable once attached to a commit. Deriving a new root
//! (staging a table, dropping a table) clones the name → `Arc` map, not the
//! snapshots, so unchanged tables stay shared with every other holder.

use crate::snapshot::TableSnapshot;
use melddb_commons::TableName;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootValue {
    tables: BTreeMap<TableName, Arc<TableSnapshot>>,
}

impl RootValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &TableName) -> Option<&Arc<TableSnapshot>> {
        self.tables.get(name)
    }

    /// Find a table by its stable id, regardless of its current name.
    pub fn table_by_id(&self, table_id: u64) -> Option<(&TableName, &Arc<TableSnapshot>)> {
        if table_id == 0 {
            return None;
        }
        self.tables
            .iter()
            .find(|(_, snap)| snap.schema().table_id == table_id)
    }

    pub fn table_names(&self) -> Vec<TableName> {
        self.tables.keys().cloned().collect()
    }

    pub fn tables(&self) -> &BTreeMap<TableName, Arc<TableSnapshot>> {
        &self.tables
    }

    pub fn has_table(&self, name: &TableName) -> bool {
        self.tables.contains_key(name)
    }

    /// A new root with `name` mapped to `snapshot`; all other tables shared.
    pub fn with_table(&self, name: TableName, snapshot: Arc<TableSnapshot>) -> Self {
        let mut tables = self.tables.clone();
        tables.insert(name, snapshot);
        Self { tables }
    }

    /// A new root without `name`.
    pub fn without_table(&self, name: &TableName) -> Self {
        let mut tables = self.tables.clone();
        tables.remove(name);
        Self { tables }
    }

    /// Content hash folded into the hash of the owning commit.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (name, snapshot) in &self.tables {
            hasher.update(name.as_str().as_bytes());
            hasher.update(snapshot.content_hash());
        }
        hasher.finalize().into()
    }
}
