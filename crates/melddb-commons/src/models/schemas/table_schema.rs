//! Complete table schema: columns, indexes, checks, and foreign keys.

use crate::errors::CommonError;
use crate::ids::TableName;
use crate::models::row::{Row, RowKey};
use crate::models::schemas::{
    CheckConstraint, ColumnDefinition, ForeignKeyConstraint, IndexDefinition,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name used for the implicit primary-key index.
pub const PRIMARY_INDEX_NAME: &str = "PRIMARY";

/// Complete definition of one table's schema.
///
/// `table_id` is a stable identity that survives table renames, the same way
/// column tags survive column renames; the merge driver matches tables across
/// branches by id so a rename is not mistaken for a drop-and-create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name (case-sensitive)
    pub table_name: TableName,

    /// Stable table identity, preserved across renames (0 = unassigned)
    pub table_id: u64,

    /// Column definitions, ordered by ordinal_position
    pub columns: Vec<ColumnDefinition>,

    /// Secondary indexes
    pub indexes: Vec<IndexDefinition>,

    /// CHECK constraints
    pub checks: Vec<CheckConstraint>,

    /// Foreign keys declared on this table (child side)
    pub foreign_keys: Vec<ForeignKeyConstraint>,

    /// Next column tag to assign
    next_column_tag: u64,
}

impl TableSchema {
    /// Create a schema from columns, validating ordinals and assigning
    /// column tags to any column that does not carry one.
    pub fn new(
        table_name: TableName,
        columns: Vec<ColumnDefinition>,
    ) -> Result<Self, CommonError> {
        let mut columns = Self::validate_and_sort_columns(columns)?;
        let mut next_tag = columns.iter().map(|c| c.tag).max().unwrap_or(0) + 1;
        for col in &mut columns {
            if col.tag == 0 {
                col.tag = next_tag;
                next_tag += 1;
            }
        }

        Ok(Self {
            table_name,
            table_id: 0,
            columns,
            indexes: Vec::new(),
            checks: Vec::new(),
            foreign_keys: Vec::new(),
            next_column_tag: next_tag,
        })
    }

    pub fn with_table_id(mut self, table_id: u64) -> Self {
        self.table_id = table_id;
        self
    }

    /// Validate and sort columns by ordinal_position: positions must be
    /// dense, 1-based, and unique.
    fn validate_and_sort_columns(
        mut columns: Vec<ColumnDefinition>,
    ) -> Result<Vec<ColumnDefinition>, CommonError> {
        let mut positions = HashSet::new();
        let mut names = HashSet::new();
        for col in &columns {
            if col.ordinal_position == 0 {
                return Err(CommonError::invalid_input(format!(
                    "column '{}' has invalid ordinal_position 0 (must be >= 1)",
                    col.column_name
                )));
            }
            if !positions.insert(col.ordinal_position) {
                return Err(CommonError::invalid_input(format!(
                    "duplicate ordinal_position {}",
                    col.ordinal_position
                )));
            }
            if !names.insert(col.column_name.clone()) {
                return Err(CommonError::already_exists(format!(
                    "column '{}'",
                    col.column_name
                )));
            }
        }

        columns.sort_by_key(|col| col.ordinal_position);

        for (idx, col) in columns.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if col.ordinal_position != expected {
                return Err(CommonError::invalid_input(format!(
                    "non-sequential ordinal_position: expected {}, got {}",
                    expected, col.ordinal_position
                )));
            }
        }

        Ok(columns)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    pub fn column_by_tag(&self, tag: u64) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.tag == tag)
    }

    /// Names of the primary-key columns, in ordinal order.
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.column_name.clone())
            .collect()
    }

    /// A table with no primary key addresses rows by content hash.
    pub fn is_keyless(&self) -> bool {
        !self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Primary-key address of a row, or `None` for keyless tables.
    pub fn primary_key_of(&self, row: &Row) -> Option<RowKey> {
        if self.is_keyless() {
            return None;
        }
        Some(RowKey::primary(row.project(&self.primary_key_columns())))
    }

    /// Name of an index whose leading columns equal `columns`, if any.
    /// The primary key counts as an index.
    pub fn supporting_index(&self, columns: &[String]) -> Option<String> {
        let pk = self.primary_key_columns();
        if !pk.is_empty() && columns.len() <= pk.len() && pk[..columns.len()] == *columns {
            return Some(PRIMARY_INDEX_NAME.to_string());
        }
        self.indexes
            .iter()
            .find(|idx| idx.supports_prefix(columns))
            .map(|idx| idx.name.clone())
    }

    fn require_columns(&self, columns: &[String], context: &str) -> Result<(), CommonError> {
        for col in columns {
            if self.column(col).is_none() {
                return Err(CommonError::not_found(format!(
                    "column '{}' referenced by {} in table '{}'",
                    col, context, self.table_name
                )));
            }
        }
        Ok(())
    }

    /// Add a column. The ordinal must be the next available position
    /// (ALTER TABLE ADD COLUMN appends).
    pub fn add_column(&mut self, mut column: ColumnDefinition) -> Result<(), CommonError> {
        let max_ordinal = self.columns.iter().map(|c| c.ordinal_position).max().unwrap_or(0);
        if column.ordinal_position != max_ordinal + 1 {
            return Err(CommonError::invalid_input(format!(
                "new column must have ordinal_position {}, got {}",
                max_ordinal + 1,
                column.ordinal_position
            )));
        }
        if self.column(&column.column_name).is_some() {
            return Err(CommonError::already_exists(format!(
                "column '{}'",
                column.column_name
            )));
        }
        if column.tag == 0 {
            column.tag = self.next_column_tag;
            self.next_column_tag += 1;
        }
        self.columns.push(column);
        Ok(())
    }

    /// Drop a column. Hard error if any foreign key, check, or index on this
    /// table still references it. Does not renumber remaining ordinals.
    pub fn drop_column(&mut self, column_name: &str) -> Result<ColumnDefinition, CommonError> {
        let position = self
            .columns
            .iter()
            .position(|c| c.column_name == column_name)
            .ok_or_else(|| CommonError::not_found(format!("column '{}'", column_name)))?;

        if let Some(fk) = self
            .foreign_keys
            .iter()
            .find(|fk| fk.columns.iter().any(|c| c == column_name))
        {
            return Err(CommonError::invalid_input(format!(
                "unable to drop column '{}': it is used by foreign key constraint `{}`",
                column_name, fk.name
            )));
        }
        if let Some(check) = self.checks.iter().find(|c| c.references_column(column_name)) {
            return Err(CommonError::invalid_input(format!(
                "unable to drop column '{}': it is referenced by check constraint `{}`",
                column_name, check.name
            )));
        }
        if let Some(idx) = self
            .indexes
            .iter()
            .find(|i| i.columns.iter().any(|c| c == column_name))
        {
            return Err(CommonError::invalid_input(format!(
                "unable to drop column '{}': it is indexed by `{}`",
                column_name, idx.name
            )));
        }

        Ok(self.columns.remove(position))
    }

    /// Rename a column, propagating the new name into indexes, checks, and
    /// the child side of this table's foreign keys. The column keeps its tag.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), CommonError> {
        if self.column(to).is_some() {
            return Err(CommonError::already_exists(format!("column '{}'", to)));
        }
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.column_name == from)
            .ok_or_else(|| CommonError::not_found(format!("column '{}'", from)))?;
        col.column_name = to.to_string();

        for idx in &mut self.indexes {
            for c in &mut idx.columns {
                if c == from {
                    *c = to.to_string();
                }
            }
        }
        for check in &mut self.checks {
            for c in &mut check.columns {
                if c == from {
                    *c = to.to_string();
                }
            }
        }
        for fk in &mut self.foreign_keys {
            for c in &mut fk.columns {
                if c == from {
                    *c = to.to_string();
                }
            }
        }
        Ok(())
    }

    pub fn add_index(&mut self, index: IndexDefinition) -> Result<(), CommonError> {
        if index.name == PRIMARY_INDEX_NAME {
            return Err(CommonError::invalid_input(format!(
                "index name `{}` is reserved",
                PRIMARY_INDEX_NAME
            )));
        }
        if self.indexes.iter().any(|i| i.name == index.name) {
            return Err(CommonError::already_exists(format!("index `{}`", index.name)));
        }
        self.require_columns(&index.columns, "index")?;
        self.indexes.push(index);
        Ok(())
    }

    /// Drop an index. Hard error when a foreign key on this table still
    /// needs it as its supporting index; the message names both the index
    /// and the blocking constraint.
    pub fn drop_index(&mut self, name: &str) -> Result<IndexDefinition, CommonError> {
        let position = self
            .indexes
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| CommonError::not_found(format!("index `{}`", name)))?;

        for fk in &self.foreign_keys {
            let others_support = {
                let pk = self.primary_key_columns();
                let pk_supports =
                    !pk.is_empty() && fk.columns.len() <= pk.len() && pk[..fk.columns.len()] == fk.columns[..];
                pk_supports
                    || self
                        .indexes
                        .iter()
                        .any(|i| i.name != name && i.supports_prefix(&fk.columns))
            };
            if self.indexes[position].supports_prefix(&fk.columns) && !others_support {
                return Err(CommonError::invalid_input(format!(
                    "unable to drop index `{}`: it is required by foreign key constraint `{}`",
                    name, fk.name
                )));
            }
        }

        Ok(self.indexes.remove(position))
    }

    pub fn add_check(&mut self, check: CheckConstraint) -> Result<(), CommonError> {
        if self.checks.iter().any(|c| c.name == check.name) {
            return Err(CommonError::already_exists(format!(
                "check constraint '{}'",
                check.name
            )));
        }
        self.require_columns(&check.columns, "check constraint")?;
        self.checks.push(check);
        Ok(())
    }

    pub fn drop_check(&mut self, name: &str) -> Result<CheckConstraint, CommonError> {
        let position = self
            .checks
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| CommonError::not_found(format!("check constraint '{}'", name)))?;
        Ok(self.checks.remove(position))
    }

    /// Record a foreign key on this (child) table. Full referential
    /// validation lives in melddb-constraints; this only guards name
    /// uniqueness within the table.
    pub fn add_foreign_key(&mut self, fk: ForeignKeyConstraint) -> Result<(), CommonError> {
        if self.foreign_keys.iter().any(|f| f.name == fk.name) {
            return Err(CommonError::already_exists(format!(
                "foreign key constraint `{}`",
                fk.name
            )));
        }
        self.foreign_keys.push(fk);
        Ok(())
    }

    pub fn drop_foreign_key(&mut self, name: &str) -> Result<ForeignKeyConstraint, CommonError> {
        let position = self
            .foreign_keys
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| {
                CommonError::not_found(format!("foreign key constraint `{}`", name))
            })?;
        Ok(self.foreign_keys.remove(position))
    }
}
