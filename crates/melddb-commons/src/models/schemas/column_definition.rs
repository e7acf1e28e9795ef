//! Column definitions.

use crate::models::value::{DataType, Value};
use serde::{Deserialize, Serialize};

/// Definition of a single table column.
///
/// Every column carries a `tag`: a stable identity that survives renames.
/// Three-way schema merge matches columns across branches by tag, which is
/// how a rename on one branch is distinguished from a drop-and-add. Tag 0
/// means "not yet assigned"; [`super::TableSchema`] assigns fresh tags when
/// the column joins a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name (case-sensitive)
    pub column_name: String,

    /// 1-based position within the table
    pub ordinal_position: u32,

    /// Stable column identity, preserved across renames
    pub tag: u64,

    /// Column data type
    pub data_type: DataType,

    /// Whether NULL is storable
    pub is_nullable: bool,

    /// Whether the column is part of the primary key
    pub is_primary_key: bool,

    /// Default value applied by the SQL layer on insert
    pub default: Option<Value>,
}

impl ColumnDefinition {
    /// A nullable, non-key column.
    pub fn simple(name: impl Into<String>, ordinal: u32, data_type: DataType) -> Self {
        Self {
            column_name: name.into(),
            ordinal_position: ordinal,
            tag: 0,
            data_type,
            is_nullable: true,
            is_primary_key: false,
            default: None,
        }
    }

    /// A NOT NULL primary-key column.
    pub fn primary_key(name: impl Into<String>, ordinal: u32, data_type: DataType) -> Self {
        Self {
            column_name: name.into(),
            ordinal_position: ordinal,
            tag: 0,
            data_type,
            is_nullable: false,
            is_primary_key: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    /// Definition equality ignoring name and position: used by schema merge
    /// to decide whether two branches changed a column identically.
    pub fn equal_defs(&self, other: &Self) -> bool {
        self.data_type == other.data_type
            && self.is_nullable == other.is_nullable
            && self.is_primary_key == other.is_primary_key
            && self.default == other.default
    }
}
