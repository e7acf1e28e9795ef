//! Live foreign key checks for child-side writes.

use crate::error::ConstraintError;
use crate::TableSet;
use melddb_commons::models::row::format_tuple;
use melddb_commons::{ForeignKeyConstraint, Row, TableName};

/// Check one foreign key for a child row about to be written.
///
/// A row with any NULL among the FK columns satisfies the constraint
/// (simple matching); otherwise the value tuple must match a parent row
/// through the referenced columns.
pub fn check_child_row(
    fk: &ForeignKeyConstraint,
    row: &Row,
    tables: &TableSet,
) -> Result<(), ConstraintError> {
    let values = row.project(&fk.columns);
    if values.iter().any(|v| v.is_null()) {
        return Ok(());
    }

    let matched = tables
        .get(&fk.referenced_table)
        .is_some_and(|parent| parent.contains_match(&fk.referenced_columns, &values));

    if matched {
        Ok(())
    } else {
        Err(violation(fk, &values))
    }
}

/// Check every foreign key declared on `table` for a row about to be
/// written. Constraints are independent: a NULL-covered constraint passes
/// even while another one fails.
pub fn check_row(
    table: &TableName,
    row: &Row,
    tables: &TableSet,
) -> Result<(), ConstraintError> {
    let snapshot = match tables.get(table) {
        Some(s) => s,
        None => return Ok(()),
    };
    for fk in &snapshot.schema().foreign_keys {
        check_child_row(fk, row, tables)?;
    }
    Ok(())
}

pub(crate) fn violation(
    fk: &ForeignKeyConstraint,
    values: &[melddb_commons::Value],
) -> ConstraintError {
    ConstraintError::ForeignKeyViolation {
        constraint: fk.name.clone(),
        table: fk.table.to_string(),
        referenced_table: fk.referenced_table.to_string(),
        key: format_tuple(values),
    }
}
