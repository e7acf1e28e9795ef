//! Session settings structs.

use super::defaults::*;
use serde::{Deserialize, Serialize};

/// Per-session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Live foreign key checking (`FOREIGN_KEY_CHECKS`). When disabled, rows
    /// written are not validated and are not retroactively validated on
    /// re-enable; violations surface on the row's next write or an explicit
    /// verification pass.
    #[serde(default = "default_true")]
    pub foreign_key_checks: bool,

    /// Commit author recorded on commits created by this session.
    #[serde(default = "default_author")]
    pub author: String,

    #[serde(default)]
    pub merge: MergeSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            foreign_key_checks: true,
            author: default_author(),
            merge: MergeSettings::default(),
        }
    }
}

/// Merge behavior settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeSettings {
    /// Allow `commit` to succeed while the conflict ledger is non-empty,
    /// carrying the unresolved ledger forward into the new commit.
    #[serde(default)]
    pub allow_commit_with_conflicts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SessionSettings::default();
        assert!(settings.foreign_key_checks);
        assert!(!settings.merge.allow_commit_with_conflicts);
        assert_eq!(settings.author, "melddb");
    }

    #[test]
    fn test_deserialize_empty_object_uses_defaults() {
        let settings: SessionSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.foreign_key_checks);
        assert!(!settings.merge.allow_commit_with_conflicts);
    }
}
