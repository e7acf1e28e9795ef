//! # melddb-commons
//!
//! Shared models for MeldDB: scalar values, rows, table schemas, constraint
//! definitions, typed identifiers, session configuration, and the common
//! error type. Every other MeldDB crate builds on these types, so this crate
//! carries no dependency on the versioning or merge machinery.

pub mod config;
pub mod errors;
pub mod ids;
pub mod models;

pub use config::{MergeSettings, SessionSettings};
pub use errors::{CommonError, Result};
pub use ids::{BranchName, TableName};
pub use models::row::{Row, RowKey};
pub use models::schemas::{
    CheckConstraint, ColumnDefinition, ForeignKeyConstraint, IndexDefinition, ReferentialAction,
    TableSchema, PRIMARY_INDEX_NAME,
};
pub use models::value::{DataType, Value};
pub use models::violations::{ConflictEntry, ConstraintViolation, ViolationKind};
