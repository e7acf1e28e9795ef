//! Table schema models: columns, indexes, check constraints, foreign keys.

mod check_constraint;
mod column_definition;
mod foreign_key;
mod index_definition;
mod table_schema;

pub use check_constraint::CheckConstraint;
pub use column_definition::ColumnDefinition;
pub use foreign_key::{ForeignKeyConstraint, ReferentialAction};
pub use index_definition::IndexDefinition;
pub use table_schema::{TableSchema, PRIMARY_INDEX_NAME};
