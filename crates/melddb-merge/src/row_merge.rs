//! Three-way row merge for one table.
//!
//! Both sides are diffed against the base snapshot and reconciled per key:
//! an identical result on both sides is accepted once, a change on exactly
//! one side is accepted, and divergent changes (including delete-vs-modify)
//! become [`ConflictEntry`] rows. A conflict on one key never blocks the
//! rest of the table.

use crate::row_diff::diff_rows;
use melddb_commons::{ConflictEntry, TableName};
use melddb_versioning::TableSnapshot;
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct RowMergeOutcome {
    pub snapshot: TableSnapshot,
    pub conflicts: Vec<ConflictEntry>,
}

/// Merge `ours` and `theirs` against `base`. All three snapshots must
/// already carry the merged schema (schema merge re-keys rows first).
pub fn merge_rows(
    table: &TableName,
    base: &TableSnapshot,
    ours: &TableSnapshot,
    theirs: &TableSnapshot,
) -> RowMergeOutcome {
    // Whole-table short circuits.
    if theirs.rows() == base.rows() {
        return RowMergeOutcome {
            snapshot: ours.clone(),
            conflicts: Vec::new(),
        };
    }
    if ours.rows() == base.rows() {
        return RowMergeOutcome {
            snapshot: theirs.clone(),
            conflicts: Vec::new(),
        };
    }

    let our_diff = diff_rows(base, ours);
    let their_diff = diff_rows(base, theirs);

    let mut merged = ours.clone();
    let mut conflicts = Vec::new();

    let keys: BTreeSet<_> = our_diff
        .added
        .keys()
        .chain(our_diff.removed.keys())
        .chain(our_diff.modified.keys())
        .chain(their_diff.added.keys())
        .chain(their_diff.removed.keys())
        .chain(their_diff.modified.keys())
        .cloned()
        .collect();

    for key in keys {
        let our_change = our_diff.change_for(&key);
        let their_change = their_diff.change_for(&key);

        match (our_change, their_change) {
            // Only we changed it: already in `merged`.
            (Some(_), None) | (None, None) => {}
            // Only they changed it: take theirs.
            (None, Some(change)) => match change.result() {
                Some(row) => merged.put(key, row.clone()),
                None => {
                    merged.delete(&key);
                }
            },
            (Some(ours_c), Some(theirs_c)) => {
                let our_result = ours_c.result();
                let their_result = theirs_c.result();
                if our_result == their_result {
                    // Identical change on both sides, taken once.
                    continue;
                }
                conflicts.push(ConflictEntry::new(
                    table.clone(),
                    key.clone(),
                    base.get(&key).cloned(),
                    our_result.cloned(),
                    their_result.cloned(),
                ));
            }
        }
    }

    log::debug!(
        "row merge for '{}': {} conflict(s), {} row(s)",
        table,
        conflicts.len(),
        merged.row_count()
    );
    RowMergeOutcome {
        snapshot: merged,
        conflicts,
    }
}
