//! Immutable per-commit table snapshots.
//!
//! A snapshot owns one table's schema and its full row set, addressed by
//! [`RowKey`]. Snapshots referenced from commits are shared read-only behind
//! `Arc`; the working set clones a snapshot before editing it (copy-on-write
//! at table granularity).

use crate::error::VersioningError;
use melddb_commons::{Row, RowKey, TableSchema, Value};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    schema: TableSchema,
    rows: BTreeMap<RowKey, Row>,
}

impl TableSnapshot {
    pub fn empty(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
        }
    }

    /// Build a snapshot from unkeyed rows. Keyed tables reject duplicate
    /// primary keys; keyless tables assign occurrence indexes so duplicate
    /// rows stay distinct.
    pub fn from_rows(schema: TableSchema, rows: Vec<Row>) -> Result<Self, VersioningError> {
        let mut snapshot = Self::empty(schema);
        for row in rows {
            snapshot.insert_row(row)?;
        }
        Ok(snapshot)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &BTreeMap<RowKey, Row> {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    /// The address this row would have in this snapshot. For keyless tables
    /// the occurrence index is the number of identical rows already present.
    pub fn key_for(&self, row: &Row) -> RowKey {
        match self.schema.primary_key_of(row) {
            Some(key) => key,
            None => {
                let hash = row.content_hash();
                let occurrence = self.keyless_count(hash);
                RowKey::Keyless { hash, occurrence }
            }
        }
    }

    fn keyless_count(&self, hash: u64) -> u64 {
        self.rows
            .range(
                RowKey::Keyless { hash, occurrence: 0 }
                    ..=RowKey::Keyless { hash, occurrence: u64::MAX },
            )
            .count() as u64
    }

    /// Insert a new row. Duplicate primary keys are rejected; duplicate
    /// keyless rows get the next occurrence index.
    pub fn insert_row(&mut self, row: Row) -> Result<RowKey, VersioningError> {
        let key = self.key_for(&row);
        if let RowKey::Primary(_) = key {
            if self.rows.contains_key(&key) {
                return Err(VersioningError::DuplicatePrimaryKey {
                    table: self.schema.table_name.to_string(),
                    key: key.display_tuple(),
                });
            }
        }
        self.rows.insert(key.clone(), row);
        Ok(key)
    }

    /// Insert or replace the row at an explicit key. Used by merge and
    /// conflict resolution, which address rows by key.
    pub fn put(&mut self, key: RowKey, row: Row) {
        self.rows.insert(key, row);
    }

    /// Delete the row at a key. For keyless keys the highest occurrence of
    /// the same content hash is removed (all copies are identical), keeping
    /// occurrence indexes dense.
    pub fn delete(&mut self, key: &RowKey) -> Option<Row> {
        match key {
            RowKey::Primary(_) => self.rows.remove(key),
            RowKey::Keyless { hash, .. } => {
                let count = self.keyless_count(*hash);
                if count == 0 {
                    return None;
                }
                self.rows.remove(&RowKey::Keyless {
                    hash: *hash,
                    occurrence: count - 1,
                })
            }
        }
    }

    /// Replace the row at `key` with `row`, re-addressing it if the new
    /// values change its primary key.
    pub fn update(&mut self, key: &RowKey, row: Row) -> Result<RowKey, VersioningError> {
        self.delete(key);
        self.insert_row(row)
    }

    /// Keys of rows whose `columns` project to `values`. Scan-based; the
    /// schema's supporting index makes the lookup legal, not fast.
    pub fn matching_keys(&self, columns: &[String], values: &[Value]) -> Vec<RowKey> {
        self.rows
            .iter()
            .filter(|(_, row)| row.project(columns) == values)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Whether any row projects `columns` to `values`.
    pub fn contains_match(&self, columns: &[String], values: &[Value]) -> bool {
        self.rows.values().any(|row| row.project(columns) == values)
    }

    /// Replace the schema and re-address every row under it. Used after a
    /// schema merge changes row addressing (e.g. a renamed key column).
    pub fn rekey_with_schema(&self, schema: TableSchema) -> Result<Self, VersioningError> {
        Self::from_rows(schema, self.rows.values().cloned().collect())
    }

    /// Content hash over schema and rows, folded into commit hashes.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.schema.table_name.as_str().as_bytes());
        hasher.update(self.schema.table_id.to_be_bytes());
        for col in &self.schema.columns {
            hasher.update(col.column_name.as_bytes());
            hasher.update(col.tag.to_be_bytes());
            hasher.update([col.is_nullable as u8, col.is_primary_key as u8]);
        }
        for (key, row) in &self.rows {
            hasher.update(key.display_tuple().as_bytes());
            hasher.update(row.content_hash().to_be_bytes());
        }
        hasher.finalize().into()
    }
}
