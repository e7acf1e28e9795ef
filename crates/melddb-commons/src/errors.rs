//! Shared error types for MeldDB.
//!
//! Every crate defines its own error enum for its own failure modes; this
//! module holds the variants that cross crate boundaries. Messages are stable
//! substrings callers are allowed to grep on, so changing them is a breaking
//! change.

use thiserror::Error;

/// Common error type for MeldDB operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommonError {
    /// Invalid input provided to a function
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found (branch, table, column, commit, etc.)
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource already exists (duplicate creation)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A feature that is intentionally not supported
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Internal error (unexpected state)
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommonError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convenience alias used across melddb-commons.
pub type Result<T> = std::result::Result<T, CommonError>;
