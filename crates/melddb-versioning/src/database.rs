//! The database handle shared by all sessions.
//!
//! Owns the commit graph, branch pointers, and one working set per branch.
//! Working sets are handed out behind a `parking_lot::Mutex` so concurrent
//! writers to the same branch serialize (single-writer rule); sessions on
//! different branches never contend.

use crate::branches::BranchStore;
use crate::commit::{Commit, CommitHash};
use crate::commit_graph::CommitGraph;
use crate::error::VersioningError;
use crate::root_value::RootValue;
use crate::working_set::WorkingSet;
use dashmap::DashMap;
use melddb_commons::BranchName;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug)]
pub struct Database {
    pub graph: CommitGraph,
    pub branches: BranchStore,
    working_sets: DashMap<BranchName, Arc<Mutex<WorkingSet>>>,
    next_table_id: AtomicU64,
}

impl Database {
    /// Create a database with an empty root commit on the default branch.
    pub fn init(author: &str) -> Arc<Self> {
        let db = Self {
            graph: CommitGraph::new(),
            branches: BranchStore::new(),
            working_sets: DashMap::new(),
            next_table_id: AtomicU64::new(1),
        };
        let initial = db.graph.insert(Commit::new(
            vec![],
            Arc::new(RootValue::new()),
            author,
            "initialize data repository",
        ));
        db.branches
            .create(BranchName::new(DEFAULT_BRANCH), initial.hash.clone())
            .expect("fresh branch store cannot collide");
        log::info!("database initialized at {}", initial.hash.short());
        Arc::new(db)
    }

    /// Stable table ids survive renames; allocated once per CREATE TABLE.
    pub fn allocate_table_id(&self) -> u64 {
        self.next_table_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn head_commit(&self, branch: &BranchName) -> Result<Arc<Commit>, VersioningError> {
        let hash = self.branches.head(branch)?;
        self.graph.must_get(&hash)
    }

    /// The working set for a branch, created lazily at the branch head.
    pub fn working_set(
        &self,
        branch: &BranchName,
    ) -> Result<Arc<Mutex<WorkingSet>>, VersioningError> {
        if let Some(ws) = self.working_sets.get(branch) {
            return Ok(ws.clone());
        }
        let head = self.branches.head(branch)?;
        let ws = Arc::new(Mutex::new(WorkingSet::new(branch.clone(), head)));
        // Another session may have raced us; keep whichever landed first.
        Ok(self
            .working_sets
            .entry(branch.clone())
            .or_insert(ws)
            .clone())
    }

    pub fn create_branch(
        &self,
        name: BranchName,
        at: CommitHash,
    ) -> Result<(), VersioningError> {
        self.graph.must_get(&at)?;
        self.branches.create(name, at)
    }

    pub fn delete_branch(&self, name: &BranchName) -> Result<(), VersioningError> {
        self.branches.delete(name)?;
        self.working_sets.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_default_branch() {
        let db = Database::init("dev");
        let head = db.head_commit(&BranchName::new(DEFAULT_BRANCH)).unwrap();
        assert!(head.is_root_commit());
    }

    #[test]
    fn test_working_set_is_shared_per_branch() {
        let db = Database::init("dev");
        let main = BranchName::new(DEFAULT_BRANCH);
        let a = db.working_set(&main).unwrap();
        let b = db.working_set(&main).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_create_branch_requires_known_commit() {
        let db = Database::init("dev");
        let bogus = Commit::new(vec![], Arc::new(RootValue::new()), "dev", "nowhere").hash;
        assert!(db.create_branch(BranchName::new("dev"), bogus).is_err());

        let head = db.branches.head(&BranchName::new(DEFAULT_BRANCH)).unwrap();
        db.create_branch(BranchName::new("dev"), head).unwrap();
        assert!(db.head_commit(&BranchName::new("dev")).is_ok());
    }

    #[test]
    fn test_table_ids_monotonic() {
        let db = Database::init("dev");
        let a = db.allocate_table_id();
        let b = db.allocate_table_id();
        assert!(b > a);
    }
}
