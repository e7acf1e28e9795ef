//! The commit DAG store: ancestry walks and merge-base computation.

use crate::commit::{Commit, CommitHash};
use crate::error::VersioningError;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Append-only store of commits keyed by hash.
#[derive(Debug, Default)]
pub struct CommitGraph {
    commits: DashMap<CommitHash, Arc<Commit>>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, commit: Commit) -> Arc<Commit> {
        let commit = Arc::new(commit);
        self.commits.insert(commit.hash.clone(), commit.clone());
        log::debug!(
            "commit {} inserted ({} parent(s))",
            commit.hash.short(),
            commit.parents.len()
        );
        commit
    }

    pub fn get(&self, hash: &CommitHash) -> Option<Arc<Commit>> {
        self.commits.get(hash).map(|c| c.clone())
    }

    pub fn must_get(&self, hash: &CommitHash) -> Result<Arc<Commit>, VersioningError> {
        self.get(hash)
            .ok_or_else(|| VersioningError::CommitNotFound(hash.short().to_string()))
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Whether `ancestor` is reachable from `descendant` through parent
    /// links. A commit is its own ancestor.
    pub fn is_ancestor(
        &self,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> Result<bool, VersioningError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([descendant.clone()]);
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            let commit = self.must_get(&hash)?;
            for parent in &commit.parents {
                if parent == ancestor {
                    return Ok(true);
                }
                queue.push_back(parent.clone());
            }
        }
        Ok(false)
    }

    /// Closest common ancestor of two commits: the first commit reachable
    /// from `b` (breadth-first) that is also an ancestor of `a`. Returns
    /// `None` only for disconnected histories.
    pub fn merge_base(
        &self,
        a: &CommitHash,
        b: &CommitHash,
    ) -> Result<Option<CommitHash>, VersioningError> {
        let mut ancestors_of_a = HashSet::new();
        let mut queue = VecDeque::from([a.clone()]);
        while let Some(hash) = queue.pop_front() {
            if !ancestors_of_a.insert(hash.clone()) {
                continue;
            }
            let commit = self.must_get(&hash)?;
            queue.extend(commit.parents.iter().cloned());
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([b.clone()]);
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            if ancestors_of_a.contains(&hash) {
                return Ok(Some(hash));
            }
            let commit = self.must_get(&hash)?;
            queue.extend(commit.parents.iter().cloned());
        }
        Ok(None)
    }
}
