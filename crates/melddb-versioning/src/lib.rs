//! # melddb-versioning
//!
//! The version-control substrate of MeldDB: an immutable commit DAG, root
//! values mapping table names to snapshots, copy-on-write table snapshots,
//! branch pointers, and the mutable per-branch working set.
//!
//! ## Architecture
//!
//! ```text
//! melddb-session (orchestration)
//!     ↓
//! melddb-merge / melddb-constraints (pure logic over snapshots)
//!     ↓
//! melddb-versioning (commits, snapshots, branches)
//! ```
//!
//! Commits, root values, and snapshots are never mutated after creation;
//! working sets build on them copy-on-write, so sessions on different
//! branches never contend.

pub mod branches;
pub mod commit;
pub mod commit_graph;
pub mod database;
pub mod error;
pub mod root_value;
pub mod snapshot;
pub mod working_set;

pub use branches::BranchStore;
pub use commit::{Commit, CommitHash};
pub use commit_graph::CommitGraph;
pub use database::{Database, DEFAULT_BRANCH};
pub use error::VersioningError;
pub use root_value::RootValue;
pub use snapshot::TableSnapshot;
pub use working_set::{MergeState, WorkingSet};
