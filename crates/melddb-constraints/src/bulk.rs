//! Bulk loading with per-row violation skipping.
//!
//! Import paths want "load what you can" semantics: rows that would break a
//! foreign key or collide on a primary key are skipped with a warning, and
//! the rest land. The outcome reports both sides so callers can surface the
//! skip count.

use crate::checker;
use crate::TableSet;
use melddb_commons::{Row, RowKey, TableName};
use melddb_versioning::VersioningError;

#[derive(Debug, Default)]
pub struct BulkInsertOutcome {
    /// Keys of the rows that were inserted, in insertion order.
    pub inserted: Vec<RowKey>,
    /// One message per skipped row.
    pub warnings: Vec<String>,
}

impl BulkInsertOutcome {
    pub fn skipped(&self) -> usize {
        self.warnings.len()
    }
}

/// Insert `rows` into `table`, skipping rows that fail a foreign key check
/// or duplicate an existing primary key. Rows are checked against the set
/// as it grows, so a batch may satisfy its own references.
pub fn insert_rows_skipping_violations(
    tables: &mut TableSet,
    table: &TableName,
    rows: Vec<Row>,
) -> Result<BulkInsertOutcome, VersioningError> {
    if !tables.contains_key(table) {
        return Err(VersioningError::TableNotFound(table.to_string()));
    }

    let mut outcome = BulkInsertOutcome::default();
    for row in rows {
        if let Err(err) = checker::check_row(table, &row, tables) {
            log::warn!("skipping row in '{}': {}", table, err);
            outcome.warnings.push(err.to_string());
            continue;
        }
        let snapshot = tables
            .get_mut(table)
            .ok_or_else(|| VersioningError::TableNotFound(table.to_string()))?;
        match snapshot.insert_row(row) {
            Ok(key) => outcome.inserted.push(key),
            Err(err @ VersioningError::DuplicatePrimaryKey { .. }) => {
                log::warn!("skipping row in '{}': {}", table, err);
                outcome.warnings.push(err.to_string());
            }
            Err(err) => return Err(err),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use melddb_commons::{
        ColumnDefinition, DataType, ForeignKeyConstraint, IndexDefinition, TableSchema, Value,
    };
    use melddb_versioning::TableSnapshot;

    fn setup() -> TableSet {
        let parent_schema = TableSchema::new(
            TableName::new("parent"),
            vec![ColumnDefinition::primary_key("id", 1, DataType::BigInt)],
        )
        .unwrap();
        let mut parent = TableSnapshot::empty(parent_schema);
        parent
            .insert_row(Row::from_pairs([("id", Value::BigInt(1))]))
            .unwrap();

        let mut child_schema = TableSchema::new(
            TableName::new("child"),
            vec![
                ColumnDefinition::primary_key("id", 1, DataType::BigInt),
                ColumnDefinition::simple("parent_id", 2, DataType::BigInt),
            ],
        )
        .unwrap();
        child_schema
            .add_index(IndexDefinition::new("idx_parent", vec!["parent_id".into()]))
            .unwrap();
        child_schema
            .add_foreign_key(ForeignKeyConstraint::new(
                "fk_parent",
                TableName::new("child"),
                vec!["parent_id".into()],
                TableName::new("parent"),
                vec!["id".into()],
            ))
            .unwrap();

        let mut tables = TableSet::new();
        tables.insert(TableName::new("parent"), parent);
        tables.insert(TableName::new("child"), TableSnapshot::empty(child_schema));
        tables
    }

    fn child_row(id: i64, parent_id: i64) -> Row {
        Row::from_pairs([
            ("id", Value::BigInt(id)),
            ("parent_id", Value::BigInt(parent_id)),
        ])
    }

    #[test]
    fn test_violating_rows_are_skipped_with_warnings() {
        let mut tables = setup();
        let outcome = insert_rows_skipping_violations(
            &mut tables,
            &TableName::new("child"),
            vec![child_row(10, 1), child_row(11, 99), child_row(12, 1)],
        )
        .unwrap();

        assert_eq!(outcome.inserted.len(), 2);
        assert_eq!(outcome.skipped(), 1);
        assert!(outcome.warnings[0].contains("`[99]`"));
        assert_eq!(tables[&TableName::new("child")].row_count(), 2);
    }

    #[test]
    fn test_duplicate_pk_skipped() {
        let mut tables = setup();
        let outcome = insert_rows_skipping_violations(
            &mut tables,
            &TableName::new("child"),
            vec![child_row(10, 1), child_row(10, 1)],
        )
        .unwrap();
        assert_eq!(outcome.inserted.len(), 1);
        assert_eq!(outcome.skipped(), 1);
        assert!(outcome.warnings[0].contains("duplicate primary key"));
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let mut tables = setup();
        let err = insert_rows_skipping_violations(&mut tables, &TableName::new("nope"), vec![])
            .unwrap_err();
        assert!(matches!(err, VersioningError::TableNotFound(_)));
    }
}
