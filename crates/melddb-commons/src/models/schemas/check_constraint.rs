//! CHECK constraint definitions.
//!
//! Expression evaluation belongs to the SQL layer; the engine stores the
//! expression text plus the set of columns it references, which is all the
//! merge and DDL machinery needs (structural comparison and dropped-column
//! detection).

use serde::{Deserialize, Serialize};

/// A named CHECK constraint on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name (unique per table)
    pub name: String,

    /// Predicate expression text, as written by the user
    pub expression: String,

    /// Names of the columns the expression references
    pub columns: Vec<String>,
}

impl CheckConstraint {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            columns,
        }
    }

    /// Definition equality ignoring the constraint name.
    pub fn equal_defs(&self, other: &Self) -> bool {
        self.expression == other.expression && self.columns == other.columns
    }

    pub fn references_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_defs() {
        let a = CheckConstraint::new("c", "x > 0", vec!["x".into()]);
        let b = CheckConstraint::new("other", "x > 0", vec!["x".into()]);
        let c = CheckConstraint::new("c", "x > 1", vec!["x".into()]);
        assert!(a.equal_defs(&b));
        assert!(!a.equal_defs(&c));
    }

    #[test]
    fn test_references_column() {
        let check = CheckConstraint::new("c", "x > y", vec!["x".into(), "y".into()]);
        assert!(check.references_column("y"));
        assert!(!check.references_column("z"));
    }
}
