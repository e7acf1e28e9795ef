//! Merge errors.
//!
//! Schema conflicts abort the merge as a unit and enumerate every conflict
//! found; no partial schema is ever committed. Row-level divergence is not
//! an error at all, it lands in the ledger.

use crate::schema_merge::SchemaConflict;
use melddb_commons::CommonError;
use melddb_versioning::VersioningError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    /// Structural divergence that cannot be auto-merged. Carries every
    /// conflict found across every table, not just the first.
    #[error("schema conflicts prevent merging:\n{}", format_conflicts(.0))]
    SchemaConflicts(Vec<SchemaConflict>),

    #[error(transparent)]
    Versioning(#[from] VersioningError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

fn format_conflicts(conflicts: &[SchemaConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("  table '{}': {}", c.table, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use melddb_commons::TableName;

    #[test]
    fn test_schema_conflicts_enumerate_all() {
        let err = MergeError::SchemaConflicts(vec![
            SchemaConflict::new(TableName::new("a"), "divergent changes to column 'x'"),
            SchemaConflict::new(TableName::new("b"), "two checks with the name 'c' but different definitions"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("table 'a'"));
        assert!(msg.contains("table 'b'"));
        assert!(msg.contains("two checks with the name 'c'"));
    }
}
