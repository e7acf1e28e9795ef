//! # melddb-merge
//!
//! Three-way reconciliation of schema and row data across commits: the
//! schema differencer, row differencer, root-level merger, and the conflict
//! ledger that lets a merge complete with recorded defects instead of
//! aborting.
//!
//! The contract throughout: schema conflicts abort the merge with every
//! conflict enumerated; row conflicts and constraint violations never abort,
//! they populate the [`ConflictLedger`] and the merge proceeds for
//! everything else.

pub mod dep_order;
pub mod error;
pub mod ledger;
pub mod merger;
pub mod row_diff;
pub mod row_merge;
pub mod schema_merge;

pub use dep_order::merge_order;
pub use error::MergeError;
pub use ledger::ConflictLedger;
pub use merger::{merge_roots, MergeResult};
pub use row_diff::{diff_rows, RowChange, RowDiff};
pub use row_merge::{merge_rows, RowMergeOutcome};
pub use schema_merge::{merge_table_schemas, SchemaConflict};
