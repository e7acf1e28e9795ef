//! Conflict and constraint-violation ledger entries.
//!
//! Both kinds record defects a merge chose to carry rather than abort on.
//! They are independent: a `ConflictEntry` is a same-key divergence neither
//! branch's history explains; a `ConstraintViolation` is structurally valid
//! data that breaks a declared invariant.

use crate::ids::TableName;
use crate::models::row::{Row, RowKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A same-key row divergence recorded by the three-way merger.
///
/// At least one of `ours`/`theirs` is always present; `base` is absent when
/// both sides added the same key independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub table: TableName,
    pub key: RowKey,
    pub base: Option<Row>,
    pub ours: Option<Row>,
    pub theirs: Option<Row>,
}

impl ConflictEntry {
    pub fn new(
        table: TableName,
        key: RowKey,
        base: Option<Row>,
        ours: Option<Row>,
        theirs: Option<Row>,
    ) -> Self {
        Self {
            table,
            key,
            base,
            ours,
            theirs,
        }
    }

    /// A delete-vs-modify collision: one side deleted the row the other
    /// side changed.
    pub fn is_delete_modify(&self) -> bool {
        self.base.is_some() && (self.ours.is_none() ^ self.theirs.is_none())
    }
}

/// Which declared invariant a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ForeignKey,
    Unique,
    Check,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ForeignKey => "foreign key",
            Self::Unique => "unique",
            Self::Check => "check",
        };
        f.write_str(s)
    }
}

/// Referentially (or otherwise declaratively) invalid data found by a
/// validation pass. Does not abort the producing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub table: TableName,
    pub key: RowKey,
    pub constraint_name: String,
    pub kind: ViolationKind,
    /// Human-readable detail, stable enough to grep on
    pub detail: String,
}

impl ConstraintViolation {
    pub fn new(
        table: TableName,
        key: RowKey,
        constraint_name: impl Into<String>,
        kind: ViolationKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            table,
            key,
            constraint_name: constraint_name.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} violation of `{}` on table `{}`, key: `{}`: {}",
            self.kind, self.constraint_name, self.table, self.key, self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value::Value;

    #[test]
    fn test_delete_modify_detection() {
        let table = TableName::new("t");
        let key = RowKey::primary(vec![Value::Int(1)]);
        let row = Row::from_pairs([("id", Value::Int(1))]);

        let both = ConflictEntry::new(
            table.clone(),
            key.clone(),
            Some(row.clone()),
            Some(row.clone()),
            Some(row.clone()),
        );
        assert!(!both.is_delete_modify());

        let del_mod = ConflictEntry::new(table, key, Some(row.clone()), None, Some(row));
        assert!(del_mod.is_delete_modify());
    }

    #[test]
    fn test_violation_display() {
        let v = ConstraintViolation::new(
            TableName::new("child"),
            RowKey::primary(vec![Value::Int(9)]),
            "fk1",
            ViolationKind::ForeignKey,
            "no parent row",
        );
        let s = v.to_string();
        assert!(s.contains("foreign key violation of `fk1`"));
        assert!(s.contains("`[9]`"));
    }
}
