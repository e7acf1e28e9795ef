//! # melddb-session
//!
//! The user-facing surface of MeldDB: a branch-scoped [`Session`] exposing
//! table and row operations with live constraint enforcement, commits, and
//! branch merging with the conflict ledger and its state machine.

pub mod error;
pub mod session;

pub use error::SessionError;
pub use session::{MergeOptions, MergeOutcome, Session};
