//! Row-level diff between two table snapshots.

use melddb_commons::{Row, RowKey};
use melddb_versioning::TableSnapshot;
use std::collections::BTreeMap;

/// Difference of one table's rows from an old snapshot to a new one, keyed
/// by [`RowKey`]. Keyless tables diff on (content hash, occurrence), so a
/// change in duplicate cardinality shows up as adds or removes rather than
/// disappearing as a no-op.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RowDiff {
    pub added: BTreeMap<RowKey, Row>,
    pub removed: BTreeMap<RowKey, Row>,
    /// key → (old row, new row)
    pub modified: BTreeMap<RowKey, (Row, Row)>,
}

impl RowDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    /// The change recorded for a key, if any.
    pub fn change_for(&self, key: &RowKey) -> Option<RowChange<'_>> {
        if let Some(row) = self.added.get(key) {
            return Some(RowChange::Added(row));
        }
        if let Some(row) = self.removed.get(key) {
            return Some(RowChange::Removed(row));
        }
        self.modified
            .get(key)
            .map(|(old, new)| RowChange::Modified { old, new })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowChange<'a> {
    Added(&'a Row),
    Removed(&'a Row),
    Modified { old: &'a Row, new: &'a Row },
}

impl<'a> RowChange<'a> {
    /// The row this change leaves behind, `None` for a removal.
    pub fn result(&self) -> Option<&'a Row> {
        match self {
            Self::Added(row) => Some(row),
            Self::Removed(_) => None,
            Self::Modified { new, .. } => Some(new),
        }
    }
}

/// Diff `new` against `old`.
pub fn diff_rows(old: &TableSnapshot, new: &TableSnapshot) -> RowDiff {
    let mut diff = RowDiff::default();
    for (key, old_row) in old.rows() {
        match new.get(key) {
            None => {
                diff.removed.insert(key.clone(), old_row.clone());
            }
            Some(new_row) if new_row != old_row => {
                diff.modified
                    .insert(key.clone(), (old_row.clone(), new_row.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, new_row) in new.rows() {
        if old.get(key).is_none() {
            diff.added.insert(key.clone(), new_row.clone());
        }
    }
    diff
}
