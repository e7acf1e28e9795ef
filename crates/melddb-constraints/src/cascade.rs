//! Cascading parent mutations.
//!
//! Deleting or updating a referenced parent row walks the foreign key graph
//! and applies each constraint's referential action to matching child rows.
//! The walk carries a visited set keyed by (table, key, action) so cyclic
//! and self-referential constraint graphs terminate; recursion never runs
//! unbounded.
//!
//! The engine mutates the `TableSet` it was given. Callers that need
//! RESTRICT to leave every table untouched run the engine on a clone and
//! stage the result only on success.

use crate::checker;
use crate::error::ConstraintError;
use crate::{referencing_foreign_keys, TableSet};
use melddb_commons::{ReferentialAction, Row, RowKey, TableName, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ActionKind {
    Delete,
    Update,
}

pub struct CascadeEngine<'a> {
    tables: &'a mut TableSet,
    visited: HashSet<(TableName, RowKey, ActionKind)>,
}

impl<'a> CascadeEngine<'a> {
    pub fn new(tables: &'a mut TableSet) -> Self {
        Self {
            tables,
            visited: HashSet::new(),
        }
    }

    /// Delete a row, applying on-delete actions of every foreign key that
    /// references its table.
    pub fn delete_row(&mut self, table: &TableName, key: &RowKey) -> Result<(), ConstraintError> {
        if !self
            .visited
            .insert((table.clone(), key.clone(), ActionKind::Delete))
        {
            return Ok(());
        }

        let row = match self.tables.get(table).and_then(|s| s.get(key)) {
            Some(row) => row.clone(),
            // Already removed by an earlier cascade step.
            None => return Ok(()),
        };

        for (child_table, fk) in referencing_foreign_keys(self.tables, table) {
            let old_values = row.project(&fk.referenced_columns);
            if old_values.iter().any(Value::is_null) {
                continue;
            }
            let child_keys = match self.tables.get(&child_table) {
                Some(snapshot) => snapshot.matching_keys(&fk.columns, &old_values),
                None => continue,
            };
            if child_keys.is_empty() {
                continue;
            }

            match fk.on_delete {
                ReferentialAction::Restrict => {
                    return Err(ConstraintError::Restricted {
                        constraint: fk.name.clone(),
                        table: child_table.to_string(),
                    });
                }
                ReferentialAction::Cascade => {
                    log::debug!(
                        "on delete cascade via `{}`: {} row(s) in '{}'",
                        fk.name,
                        child_keys.len(),
                        child_table
                    );
                    for child_key in &child_keys {
                        self.delete_row(&child_table, child_key)?;
                    }
                }
                ReferentialAction::SetNull => {
                    for child_key in &child_keys {
                        if let Some(mut child_row) =
                            self.tables.get(&child_table).and_then(|s| s.get(child_key)).cloned()
                        {
                            for col in &fk.columns {
                                child_row.set(col.clone(), Value::Null);
                            }
                            self.update_row(&child_table, child_key, child_row)?;
                        }
                    }
                }
            }
        }

        if let Some(snapshot) = self.tables.get_mut(table) {
            snapshot.delete(key);
        }
        Ok(())
    }

    /// Replace the row at `key` with `new_row`, applying on-update actions
    /// of referencing foreign keys for every referenced column that changed.
    /// Returns the row's (possibly re-addressed) key.
    pub fn update_row(
        &mut self,
        table: &TableName,
        key: &RowKey,
        new_row: Row,
    ) -> Result<RowKey, ConstraintError> {
        if !self
            .visited
            .insert((table.clone(), key.clone(), ActionKind::Update))
        {
            return Ok(key.clone());
        }

        let old_row = self.tables.get(table).and_then(|s| s.get(key)).cloned();

        if let Some(old_row) = &old_row {
            let changed: Vec<String> = old_row
                .values
                .keys()
                .chain(new_row.values.keys())
                .filter(|col| old_row.get(col) != new_row.get(col))
                .cloned()
                .collect();

            for (child_table, fk) in referencing_foreign_keys(self.tables, table) {
                if !fk.referenced_columns.iter().any(|c| changed.contains(c)) {
                    continue;
                }
                let old_values = old_row.project(&fk.referenced_columns);
                if old_values.iter().any(Value::is_null) {
                    continue;
                }
                let child_keys = match self.tables.get(&child_table) {
                    Some(snapshot) => snapshot.matching_keys(&fk.columns, &old_values),
                    None => continue,
                };
                if child_keys.is_empty() {
                    continue;
                }

                match fk.on_update {
                    ReferentialAction::Restrict => {
                        return Err(ConstraintError::Restricted {
                            constraint: fk.name.clone(),
                            table: child_table.to_string(),
                        });
                    }
                    ReferentialAction::Cascade => {
                        let new_values = new_row.project(&fk.referenced_columns);
                        for child_key in &child_keys {
                            if let Some(mut child_row) = self
                                .tables
                                .get(&child_table)
                                .and_then(|s| s.get(child_key))
                                .cloned()
                            {
                                for (col, value) in fk.columns.iter().zip(&new_values) {
                                    child_row.set(col.clone(), value.clone());
                                }
                                self.update_row(&child_table, child_key, child_row)?;
                            }
                        }
                    }
                    ReferentialAction::SetNull => {
                        for child_key in &child_keys {
                            if let Some(mut child_row) = self
                                .tables
                                .get(&child_table)
                                .and_then(|s| s.get(child_key))
                                .cloned()
                            {
                                for col in &fk.columns {
                                    child_row.set(col.clone(), Value::Null);
                                }
                                self.update_row(&child_table, child_key, child_row)?;
                            }
                        }
                    }
                }
            }
        }

        let snapshot = self
            .tables
            .get_mut(table)
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(table.to_string()))?;
        Ok(snapshot.update(key, new_row)?)
    }

    /// Insert a child row with live checking. The checked counterpart to
    /// writing through a snapshot directly.
    pub fn insert_row_checked(
        &mut self,
        table: &TableName,
        row: Row,
    ) -> Result<RowKey, ConstraintError> {
        checker::check_row(table, &row, self.tables)?;
        let snapshot = self
            .tables
            .get_mut(table)
            .ok_or_else(|| melddb_versioning::VersioningError::TableNotFound(table.to_string()))?;
        Ok(snapshot.insert_row(row)?)
    }
}
