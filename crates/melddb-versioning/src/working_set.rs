//! The mutable working set of a checked-out branch.
//!
//! All table mutation happens here, as a copy-on-write overlay on the head
//! commit's root value. The working set also carries the merge state
//! machine: a merge stages its results like ordinary edits, but the state
//! gates what commit and a second merge are allowed to do.

use crate::commit::CommitHash;
use crate::root_value::RootValue;
use crate::snapshot::TableSnapshot;
use melddb_commons::{BranchName, TableName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Merge status of a working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeState {
    /// No merge in progress, no unresolved ledger.
    Clean,
    /// A merge is staged and awaiting commit.
    Merging,
    /// A merge is staged and the conflict/violation ledger is non-empty.
    MergingWithConflicts,
}

#[derive(Debug)]
pub struct WorkingSet {
    branch: BranchName,
    head: CommitHash,
    staged: BTreeMap<TableName, Arc<TableSnapshot>>,
    dropped: BTreeSet<TableName>,
    merge_state: MergeState,
    merge_source: Option<CommitHash>,
}

impl WorkingSet {
    pub fn new(branch: BranchName, head: CommitHash) -> Self {
        Self {
            branch,
            head,
            staged: BTreeMap::new(),
            dropped: BTreeSet::new(),
            merge_state: MergeState::Clean,
            merge_source: None,
        }
    }

    pub fn branch(&self) -> &BranchName {
        &self.branch
    }

    pub fn head(&self) -> &CommitHash {
        &self.head
    }

    pub fn merge_state(&self) -> MergeState {
        self.merge_state
    }

    /// The head commit of the merge source while a merge is staged; becomes
    /// the second parent of the merge commit (unless squashing).
    pub fn merge_source(&self) -> Option<&CommitHash> {
        self.merge_source.as_ref()
    }

    /// Uncommitted staged changes exist.
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty() || !self.dropped.is_empty()
    }

    pub fn stage_table(&mut self, name: TableName, snapshot: Arc<TableSnapshot>) {
        self.dropped.remove(&name);
        self.staged.insert(name, snapshot);
    }

    pub fn drop_table(&mut self, name: TableName) {
        self.staged.remove(&name);
        self.dropped.insert(name);
    }

    pub fn staged_table(&self, name: &TableName) -> Option<&Arc<TableSnapshot>> {
        self.staged.get(name)
    }

    pub fn is_dropped(&self, name: &TableName) -> bool {
        self.dropped.contains(name)
    }

    /// Apply the staged overlay to the head root, producing the root the
    /// next commit would carry.
    pub fn resolve_root(&self, head_root: &RootValue) -> RootValue {
        let mut root = head_root.clone();
        for name in &self.dropped {
            root = root.without_table(name);
        }
        for (name, snapshot) in &self.staged {
            root = root.with_table(name.clone(), snapshot.clone());
        }
        root
    }

    /// Enter the Merging state. Caller has already verified the set is
    /// clean; this only records the transition.
    pub fn begin_merge(&mut self, source: CommitHash) {
        log::debug!(
            "working set '{}' entering merge from {}",
            self.branch,
            source.short()
        );
        self.merge_state = MergeState::Merging;
        self.merge_source = Some(source);
    }

    pub fn mark_conflicts(&mut self) {
        self.merge_state = MergeState::MergingWithConflicts;
    }

    pub fn mark_conflicts_resolved(&mut self) {
        if self.merge_state == MergeState::MergingWithConflicts {
            self.merge_state = MergeState::Merging;
        }
    }

    /// Discard the entire staged state and ledger atomically; the working
    /// set returns to Clean at the current head. Partial discard is not a
    /// supported state.
    pub fn abort_merge(&mut self) {
        log::info!("working set '{}' merge aborted", self.branch);
        self.staged.clear();
        self.dropped.clear();
        self.merge_state = MergeState::Clean;
        self.merge_source = None;
    }

    /// Advance to a newly created commit: staged changes are now part of
    /// history, the set is Clean again.
    pub fn complete_commit(&mut self, new_head: CommitHash) {
        self.head = new_head;
        self.staged.clear();
        self.dropped.clear();
        self.merge_state = MergeState::Clean;
        self.merge_source = None;
    }

    /// Move the head without committing (checkout, fast-forward). Requires
    /// a clean working set; callers enforce that.
    pub fn reset_to(&mut self, new_head: CommitHash) {
        self.head = new_head;
        self.staged.clear();
        self.dropped.clear();
        self.merge_state = MergeState::Clean;
        self.merge_source = None;
    }
}
