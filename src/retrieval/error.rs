//! Retrieval error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a retrieval job
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Nothing to submit
    #[error("Identifier batch is empty")]
    EmptyBatch,

    /// Result location failed validation; nothing was transferred
    #[error("Unsafe result location {location:?}: {reason}")]
    UnsafeLocation { location: String, reason: String },

    /// Download of a validated location failed
    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("API error {status}: {message}")]
    Http { status: u16, message: String },

    /// The remote service answered with something the protocol does not expect
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No result location after {attempts} poll attempts")]
    PollExhausted { attempts: u32 },

    #[error("No result location within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Retrieval cancelled")]
    Cancelled,

    #[error("Invalid job transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl RetrievalError {
    /// Whether the failure is a rejected result location
    pub fn is_unsafe_location(&self) -> bool {
        matches!(self, RetrievalError::UnsafeLocation { .. })
    }
}

/// Result type alias for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RetrievalError::PollExhausted { attempts: 3 };
        assert_eq!(err.to_string(), "No result location after 3 poll attempts");

        let err = RetrievalError::UnsafeLocation {
            location: "ftp://x;y".to_string(),
            reason: "bad".to_string(),
        };
        assert!(err.is_unsafe_location());
        assert_eq!(err.to_string(), "Unsafe result location \"ftp://x;y\": bad");
    }
}
