//! # melddb-constraints
//!
//! Referential integrity for MeldDB: DDL-time foreign key validation, live
//! child-row checks, the cascading mutation engine for parent deletes and
//! updates, and the verification pass that turns dangling references into
//! ledger entries instead of hard failures.
//!
//! The invariant maintained at statement and merge boundaries: every
//! non-null child FK-column value equals some parent row's referenced-column
//! value.
//!
//! Deferred checking is an explicit two-phase protocol: writes made through
//! the unchecked path are not validated, and nothing re-validates them when
//! checking is re-enabled; violations surface on the row's next checked
//! write or an explicit [`verify::verify_all`] pass.

pub mod bulk;
pub mod cascade;
pub mod checker;
pub mod ddl;
pub mod error;
pub mod verify;

use melddb_commons::{ForeignKeyConstraint, TableName};
use melddb_versioning::TableSnapshot;
use std::collections::BTreeMap;

pub use bulk::{insert_rows_skipping_violations, BulkInsertOutcome};
pub use cascade::CascadeEngine;
pub use checker::{check_child_row, check_row};
pub use ddl::validate_foreign_key;
pub use error::ConstraintError;
pub use verify::{verify_all, verify_foreign_keys, verify_unique, CheckEvaluator};

/// The mutable working view the constraint engine operates on: one owned
/// snapshot per table. Callers clone snapshots out of the working set,
/// run the engine, and stage the result back only on success, which is how
/// RESTRICT leaves every table untouched on failure.
pub type TableSet = BTreeMap<TableName, TableSnapshot>;

/// Every foreign key (with its child table) that references `parent`,
/// including self-references.
pub fn referencing_foreign_keys(
    tables: &TableSet,
    parent: &TableName,
) -> Vec<(TableName, ForeignKeyConstraint)> {
    let mut found = Vec::new();
    for (child_name, snapshot) in tables {
        for fk in &snapshot.schema().foreign_keys {
            if &fk.referenced_table == parent {
                found.push((child_name.clone(), fk.clone()));
            }
        }
    }
    found
}
