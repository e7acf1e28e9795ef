//! Branch pointers: mutable name → commit-hash mappings.

use crate::commit::CommitHash;
use crate::error::VersioningError;
use dashmap::DashMap;
use melddb_commons::BranchName;

#[derive(Debug, Default)]
pub struct BranchStore {
    branches: DashMap<BranchName, CommitHash>,
}

impl BranchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, name: BranchName, at: CommitHash) -> Result<(), VersioningError> {
        if self.branches.contains_key(&name) {
            return Err(VersioningError::BranchAlreadyExists(name.to_string()));
        }
        log::info!("branch '{}' created at {}", name, at.short());
        self.branches.insert(name, at);
        Ok(())
    }

    pub fn head(&self, name: &BranchName) -> Result<CommitHash, VersioningError> {
        self.branches
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| VersioningError::BranchNotFound(name.to_string()))
    }

    /// Move a branch pointer. The commit must already exist in the graph;
    /// callers enforce that.
    pub fn set_head(&self, name: &BranchName, to: CommitHash) -> Result<(), VersioningError> {
        match self.branches.get_mut(name) {
            Some(mut entry) => {
                *entry = to;
                Ok(())
            }
            None => Err(VersioningError::BranchNotFound(name.to_string())),
        }
    }

    pub fn delete(&self, name: &BranchName) -> Result<CommitHash, VersioningError> {
        self.branches
            .remove(name)
            .map(|(_, hash)| hash)
            .ok_or_else(|| VersioningError::BranchNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<BranchName> {
        let mut names: Vec<BranchName> = self.branches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
