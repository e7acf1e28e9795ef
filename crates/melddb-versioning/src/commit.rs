//! Immutable commits.

use crate::root_value::RootValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Content hash identifying a commit, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable commit: a root value plus parent links and metadata.
/// Never mutated after creation; reachable commits are the only GC roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: CommitHash,
    pub parents: Vec<CommitHash>,
    pub root: Arc<RootValue>,
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Commit {
    pub fn new(
        parents: Vec<CommitHash>,
        root: Arc<RootValue>,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let author = author.into();
        let message = message.into();
        let timestamp = Utc::now();
        let hash = Self::compute_hash(&parents, &root, &author, &message, &timestamp);
        Self {
            hash,
            parents,
            root,
            author,
            message,
            timestamp,
        }
    }

    fn compute_hash(
        parents: &[CommitHash],
        root: &RootValue,
        author: &str,
        message: &str,
        timestamp: &DateTime<Utc>,
    ) -> CommitHash {
        let mut hasher = Sha256::new();
        for parent in parents {
            hasher.update(parent.as_str().as_bytes());
        }
        hasher.update(root.content_hash());
        hasher.update(author.as_bytes());
        hasher.update(message.as_bytes());
        hasher.update(timestamp.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
        let digest = hasher.finalize();
        CommitHash(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn is_root_commit(&self) -> bool {
        self.parents.is_empty()
    }

    /// A merge commit has two or more parents.
    pub fn is_merge_commit(&self) -> bool {
        self.parents.len() >= 2
    }
}
