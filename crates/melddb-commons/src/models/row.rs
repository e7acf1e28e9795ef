//! Row representation and row addressing.
//!
//! A `Row` is an ordered column-name → value map. Rows are addressed by a
//! `RowKey`: the primary-key tuple for keyed tables, or a content hash plus
//! an occurrence index for keyless tables so that duplicate rows remain
//! individually addressable (adding the same row twice is two keys).

use crate::models::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A single table row as a column-name → value map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    /// Build a row from (column, value) pairs. Convenience for tests and
    /// callers assembling literal rows.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Value for a column; missing columns read as NULL.
    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    /// Project the named columns into a tuple, in the order given.
    pub fn project(&self, columns: &[String]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c).clone()).collect()
    }

    /// Rename a column in place. No-op if the column is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(v) = self.values.remove(from) {
            self.values.insert(to.to_string(), v);
        }
    }

    /// Content hash over all columns and values, used as keyless identity.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        for (col, val) in &self.values {
            hasher.update((col.len() as u64).to_be_bytes());
            hasher.update(col.as_bytes());
            val.hash_into(&mut hasher);
        }
        let digest = hasher.finalize();
        u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"))
    }
}

/// Address of a row within one table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    /// Primary-key tuple, in primary-key column order.
    Primary(Vec<Value>),
    /// Keyless identity: content hash of the row plus an occurrence index
    /// distinguishing duplicate copies of the same row.
    Keyless { hash: u64, occurrence: u64 },
}

impl RowKey {
    pub fn primary(values: Vec<Value>) -> Self {
        Self::Primary(values)
    }

    pub fn keyless(row: &Row, occurrence: u64) -> Self {
        Self::Keyless {
            hash: row.content_hash(),
            occurrence,
        }
    }

    /// Render the key the way constraint violation messages expect:
    /// `[v]` or `[v1, v2]`.
    pub fn display_tuple(&self) -> String {
        match self {
            Self::Primary(values) => format_tuple(values),
            Self::Keyless { hash, .. } => format!("[keyless:{:016x}]", hash),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_tuple())
    }
}

/// Format a value tuple as `[v1, v2]`, matching the foreign key violation
/// message contract.
pub fn format_tuple(values: &[Value]) -> String {
    let inner: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", inner.join(", "))
}
