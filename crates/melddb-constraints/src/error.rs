//! Constraint errors.
//!
//! The foreign key violation message is a contract with callers and must
//! keep its exact shape:
//! ``Foreign key violation on fk: `NAME`, table: `CHILD`, referenced table: `PARENT`, key: `[VALUES]` ``

use melddb_commons::CommonError;
use melddb_versioning::VersioningError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstraintError {
    /// A child row references a parent value that does not exist.
    #[error("Foreign key violation on fk: `{constraint}`, table: `{table}`, referenced table: `{referenced_table}`, key: `{key}`")]
    ForeignKeyViolation {
        constraint: String,
        table: String,
        referenced_table: String,
        /// Offending child key tuple, rendered verbatim as `[v1, v2]`
        key: String,
    },

    /// A parent delete/update was blocked by a RESTRICT action.
    #[error("cannot delete or update a parent row: foreign key constraint `{constraint}` on table `{table}` restricts it")]
    Restricted { constraint: String, table: String },

    #[error(transparent)]
    Versioning(#[from] VersioningError),

    #[error(transparent)]
    Common(#[from] CommonError),
}
