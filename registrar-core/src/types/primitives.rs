use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RegistrarError;

/// Lock modes understood by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    /// Shared access, compatible with other readers
    Read,
    /// Single writer, incompatible with every other holder
    Write,
    /// Like Write; kept distinct so callers can express intent
    Exclusive,
}

impl LockType {
    /// Returns the numeric index for O(1) matrix lookup
    pub fn to_index(self) -> usize {
        match self {
            LockType::Read => 0,
            LockType::Write => 1,
            LockType::Exclusive => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockType::Read => "READ",
            LockType::Write => "WRITE",
            LockType::Exclusive => "EXCLUSIVE",
        }
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "READ" => Ok(LockType::Read),
            "WRITE" => Ok(LockType::Write),
            "EXCLUSIVE" => Ok(LockType::Exclusive),
            other => Err(RegistrarError::Validation(format!(
                "Invalid lock type '{}'. Must be one of: READ, WRITE, EXCLUSIVE",
                other
            ))),
        }
    }
}

/// Anything a `Repository` can store: a serializable record with a stable id.
pub trait Entity {
    /// Collection name, also used in not-found errors
    const KIND: &'static str;

    fn id(&self) -> &str;
}
