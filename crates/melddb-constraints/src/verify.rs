//! Full-table verification passes.
//!
//! Unlike the live checker, verification never fails the calling operation:
//! it walks every row and reports each broken constraint as a
//! [`ConstraintViolation`]. Merge uses this to ledger post-merge defects,
//! and re-enabling foreign key checking after a deferred-write window uses
//! it to surface what the window let in.
//!
//! Output order is deterministic: tables in name order, rows in key order,
//! constraints in declaration order.

use crate::TableSet;
use melddb_commons::models::row::format_tuple;
use melddb_commons::{CheckConstraint, ConstraintViolation, Row, Value, ViolationKind};
use std::collections::BTreeMap;

/// Evaluates a check constraint expression against one row.
///
/// The constraint engine has no expression language of its own; the hosting
/// layer supplies one through this trait. `None` means the expression could
/// not be evaluated, which counts as passing.
pub trait CheckEvaluator {
    fn evaluate(&self, check: &CheckConstraint, row: &Row) -> Option<bool>;
}

/// Every dangling foreign key reference across the whole table set.
pub fn verify_foreign_keys(tables: &TableSet) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    for (table_name, snapshot) in tables {
        for fk in &snapshot.schema().foreign_keys {
            let parent = tables.get(&fk.referenced_table);
            for (key, row) in snapshot.rows() {
                let values = row.project(&fk.columns);
                if values.iter().any(Value::is_null) {
                    continue;
                }
                let matched = parent
                    .is_some_and(|p| p.contains_match(&fk.referenced_columns, &values));
                if !matched {
                    violations.push(ConstraintViolation::new(
                        table_name.clone(),
                        key.clone(),
                        fk.name.clone(),
                        ViolationKind::ForeignKey,
                        format!(
                            "Foreign key violation on fk: `{}`, table: `{}`, referenced table: `{}`, key: `{}`",
                            fk.name,
                            table_name,
                            fk.referenced_table,
                            format_tuple(&values)
                        ),
                    ));
                }
            }
        }
    }
    violations
}

/// Duplicate value tuples under unique indexes. Tuples containing NULL are
/// exempt; every row of a duplicate group after the first is reported.
pub fn verify_unique(tables: &TableSet) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    for (table_name, snapshot) in tables {
        for index in &snapshot.schema().indexes {
            if !index.is_unique {
                continue;
            }
            let mut seen: BTreeMap<Vec<Value>, u64> = BTreeMap::new();
            for (key, row) in snapshot.rows() {
                let values = row.project(&index.columns);
                if values.iter().any(Value::is_null) {
                    continue;
                }
                let count = seen.entry(values.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    violations.push(ConstraintViolation::new(
                        table_name.clone(),
                        key.clone(),
                        index.name.clone(),
                        ViolationKind::Unique,
                        format!(
                            "duplicate value {} for unique index `{}`",
                            format_tuple(&values),
                            index.name
                        ),
                    ));
                }
            }
        }
    }
    violations
}

/// Rows failing their table's check constraints under `evaluator`.
pub fn verify_checks(
    tables: &TableSet,
    evaluator: &dyn CheckEvaluator,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    for (table_name, snapshot) in tables {
        for check in &snapshot.schema().checks {
            for (key, row) in snapshot.rows() {
                if evaluator.evaluate(check, row) == Some(false) {
                    violations.push(ConstraintViolation::new(
                        table_name.clone(),
                        key.clone(),
                        check.name.clone(),
                        ViolationKind::Check,
                        format!("check constraint `{}` failed: {}", check.name, check.expression),
                    ));
                }
            }
        }
    }
    violations
}

/// The combined verification pass: foreign keys, then unique indexes, then
/// check constraints when an evaluator is supplied.
pub fn verify_all(
    tables: &TableSet,
    evaluator: Option<&dyn CheckEvaluator>,
) -> Vec<ConstraintViolation> {
    let mut violations = verify_foreign_keys(tables);
    violations.extend(verify_unique(tables));
    if let Some(evaluator) = evaluator {
        violations.extend(verify_checks(tables, evaluator));
    }
    violations
}
