//! Data models shared across MeldDB crates.

pub mod row;
pub mod schemas;
pub mod value;
pub mod violations;
