//! Index error types

use crate::index::RecordKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting or loading the name index
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File was written by an incompatible version
    #[error("Unsupported index file version {found} in {path:?} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// An identifier file holds the wrong kind
    #[error("Identifier file {path:?} holds {found} ids, expected {expected}")]
    KindMismatch {
        path: PathBuf,
        found: RecordKind,
        expected: RecordKind,
    },
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
