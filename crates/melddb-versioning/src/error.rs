//! Error type for the versioning layer.

use melddb_commons::CommonError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersioningError {
    #[error("branch '{0}' not found")]
    BranchNotFound(String),

    #[error("branch '{0}' already exists")]
    BranchAlreadyExists(String),

    #[error("commit {0} not found")]
    CommitNotFound(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("duplicate primary key {key} in table '{table}'")]
    DuplicatePrimaryKey { table: String, key: String },

    #[error(transparent)]
    Common(#[from] CommonError),
}
