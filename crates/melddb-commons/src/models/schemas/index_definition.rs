//! Secondary index definitions.

use serde::{Deserialize, Serialize};

/// Definition of a secondary index.
///
/// Indexes are matched by name within a table. A foreign key needs an index
/// whose leading columns equal the FK columns (prefix match) on both the
/// child and the referenced side; the primary key counts as such an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name (unique per table)
    pub name: String,

    /// Indexed columns, in key order
    pub columns: Vec<String>,

    /// Whether the index enforces uniqueness
    pub is_unique: bool,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
        }
    }

    pub fn unique(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: true,
        }
    }

    /// Whether this index can support a lookup on `columns`: the lookup
    /// columns must equal a prefix of the index key.
    pub fn supports_prefix(&self, columns: &[String]) -> bool {
        columns.len() <= self.columns.len() && self.columns[..columns.len()] == *columns
    }

    /// Definition equality ignoring the index name.
    pub fn equal_defs(&self, other: &Self) -> bool {
        self.columns == other.columns && self.is_unique == other.is_unique
    }
}
