//! Error types for the Krane object store.

use krane_core::Kind;
use thiserror::Error;

/// Result type alias for store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: String },

    #[error("{kind} {key} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        kind: Kind,
        key: String,
        expected: u64,
        found: u64,
    },
}

impl StateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict { .. })
    }
}
