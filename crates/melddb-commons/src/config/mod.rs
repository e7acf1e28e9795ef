//! Session configuration.

mod defaults;
mod types;

pub use types::{MergeSettings, SessionSettings};
