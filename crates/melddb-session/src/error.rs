//! Session errors.
//!
//! The merge state machine messages are contracts with callers and keep
//! their exact wording.

use melddb_commons::CommonError;
use melddb_constraints::ConstraintError;
use melddb_merge::MergeError;
use melddb_versioning::VersioningError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Merge requires a clean working set.
    #[error("cannot merge with uncommitted changes")]
    DirtyWorkingSet,

    /// A second merge was started while one is already staged.
    #[error("merging is not possible because you have not committed an active merge")]
    MergeInProgress,

    /// Commit attempted while the ledger has unresolved entries and
    /// committing with conflicts is disabled.
    #[error("merge has unresolved conflicts")]
    UnresolvedConflicts,

    /// Abort attempted with no merge staged.
    #[error("there is no merge to abort")]
    NoActiveMerge,

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Versioning(#[from] VersioningError),

    #[error(transparent)]
    Common(#[from] CommonError),
}
