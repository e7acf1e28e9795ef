//! Foreign key constraint definitions.

use crate::errors::CommonError;
use crate::ids::TableName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Referential action applied to child rows when a referenced parent row is
/// deleted or updated.
///
/// SET DEFAULT is permanently unsupported and has no variant; the DDL
/// surface rejects it in [`ReferentialAction::from_sql`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    Restrict,
    Cascade,
    SetNull,
}

impl ReferentialAction {
    /// Parse a referential action clause. `SET DEFAULT` is rejected as a
    /// hard error rather than parsed and failed later.
    pub fn from_sql(s: &str) -> Result<Self, CommonError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTRICT" | "NO ACTION" => Ok(Self::Restrict),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Err(CommonError::unsupported(
                "SET DEFAULT is not supported as a referential action",
            )),
            other => Err(CommonError::invalid_input(format!(
                "unknown referential action '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
        };
        f.write_str(s)
    }
}

/// A foreign key constraint declared on a child table.
///
/// Names are unique per table and globally distinct across the database.
/// Column lists are ordered and arity-matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    /// Constraint name
    pub name: String,

    /// Child table the constraint is declared on
    pub table: TableName,

    /// Child columns, in declaration order
    pub columns: Vec<String>,

    /// Referenced (parent) table
    pub referenced_table: TableName,

    /// Referenced columns, ordered, arity-matched with `columns`
    pub referenced_columns: Vec<String>,

    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

impl ForeignKeyConstraint {
    pub fn new(
        name: impl Into<String>,
        table: TableName,
        columns: Vec<String>,
        referenced_table: TableName,
        referenced_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            columns,
            referenced_table,
            referenced_columns,
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Structural identity: same column sets against the same parent,
    /// regardless of name or actions. Schema merge matches foreign keys
    /// added on different branches by this identity.
    pub fn same_structure(&self, other: &Self) -> bool {
        self.table == other.table
            && self.columns == other.columns
            && self.referenced_table == other.referenced_table
            && self.referenced_columns == other.referenced_columns
    }

    /// Full definition equality (structure, name, and actions).
    pub fn equal_defs(&self, other: &Self) -> bool {
        self.same_structure(other)
            && self.name == other.name
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
    }

    /// Whether either referential action nulls child columns.
    pub fn uses_set_null(&self) -> bool {
        self.on_delete == ReferentialAction::SetNull || self.on_update == ReferentialAction::SetNull
    }

    /// Whether this FK references the given column of the parent table.
    pub fn references_parent_column(&self, column: &str) -> bool {
        self.referenced_columns.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fk() -> ForeignKeyConstraint {
        ForeignKeyConstraint::new(
            "fk_child_parent",
            TableName::new("child"),
            vec!["parent_id".into()],
            TableName::new("parent"),
            vec!["id".into()],
        )
    }

    #[test]
    fn test_set_default_rejected() {
        let err = ReferentialAction::from_sql("SET DEFAULT").unwrap_err();
        assert!(err.to_string().contains("SET DEFAULT is not supported"));
    }

    #[test]
    fn test_from_sql_variants() {
        assert_eq!(
            ReferentialAction::from_sql("cascade").unwrap(),
            ReferentialAction::Cascade
        );
        assert_eq!(
            ReferentialAction::from_sql("NO ACTION").unwrap(),
            ReferentialAction::Restrict
        );
        assert_eq!(
            ReferentialAction::from_sql("set null").unwrap(),
            ReferentialAction::SetNull
        );
        assert!(ReferentialAction::from_sql("bogus").is_err());
    }

    #[test]
    fn test_same_structure_ignores_name_and_actions() {
        let a = sample_fk();
        let mut b = sample_fk().on_delete(ReferentialAction::Cascade);
        b.name = "other_name".into();
        assert!(a.same_structure(&b));
        assert!(!a.equal_defs(&b));
    }

    #[test]
    fn test_default_action_is_restrict() {
        let fk = sample_fk();
        assert_eq!(fk.on_delete, ReferentialAction::Restrict);
        assert_eq!(fk.on_update, ReferentialAction::Restrict);
    }
}
