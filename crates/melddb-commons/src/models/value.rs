//! Scalar values and column data types.
//!
//! `Value` is the single scalar representation used for row data, primary
//! keys, and index keys. It carries a total order (floats compare with
//! `total_cmp`) so values can key ordered maps directly.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int,
    BigInt,
    Float,
    Text,
    Blob,
    Timestamp,
}

impl DataType {
    /// TEXT/BLOB-family types cannot participate in foreign keys.
    pub fn is_text_or_blob(&self) -> bool {
        matches!(self, Self::Text | Self::Blob)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "BOOLEAN",
            Self::Int => "INT",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Timestamp => "TIMESTAMP",
        };
        f.write_str(s)
    }
}

/// A typed scalar value.
///
/// Timestamps are stored as milliseconds since the Unix epoch; the SQL layer
/// owns parsing and display formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(i64),
}

impl Eq for Value {}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The data type of this value, or `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Int(_) => Some(DataType::Int),
            Self::BigInt(_) => Some(DataType::BigInt),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Blob(_) => Some(DataType::Blob),
            Self::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// Whether this value can be stored in a column of the given type.
    /// NULL is storable in any column type; nullability is checked separately.
    pub fn conforms_to(&self, data_type: DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(dt) => dt == data_type,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Int(_) => 2,
            Self::BigInt(_) => 3,
            Self::Float(_) => 4,
            Self::Text(_) => 5,
            Self::Blob(_) => 6,
            Self::Timestamp(_) => 7,
        }
    }

    /// Feed a canonical byte encoding of this value into a hasher.
    /// Used for keyless row identity and commit hashing.
    pub fn hash_into(&self, hasher: &mut Sha256) {
        hasher.update([self.rank()]);
        match self {
            Self::Null => {}
            Self::Boolean(b) => hasher.update([u8::from(*b)]),
            Self::Int(n) => hasher.update(n.to_be_bytes()),
            Self::BigInt(n) => hasher.update(n.to_be_bytes()),
            Self::Float(n) => hasher.update(n.to_be_bytes()),
            Self::Text(s) => {
                hasher.update((s.len() as u64).to_be_bytes());
                hasher.update(s.as_bytes());
            }
            Self::Blob(b) => {
                hasher.update((b.len() as u64).to_be_bytes());
                hasher.update(b);
            }
            Self::Timestamp(n) => hasher.update(n.to_be_bytes()),
        }
    }
}

// Manual impl because f64 carries no Hash; Float hashes its bit pattern,
// matching the bytewise identity `hash_into` uses.
impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Self::Null => {}
            Self::Boolean(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::BigInt(n) => n.hash(state),
            Self::Float(n) => n.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Blob(b) => b.hash(state),
            Self::Timestamp(n) => n.hash(state),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::BigInt(a), Self::BigInt(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::BigInt(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "0x{}", hex_string(b)),
            Self::Timestamp(n) => write!(f, "{}", n),
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::BigInt(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
