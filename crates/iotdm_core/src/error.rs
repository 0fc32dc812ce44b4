//! Error types for the resource tree.

use std::io;
use thiserror::Error;

/// Result type for resource tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur in resource tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Backing store error.
    #[error("store error: {0}")]
    Store(#[from] iotdm_store::StoreError),

    /// I/O error (worker thread spawn).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record the operation depends on was not found.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Kind of record.
        kind: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// The cache or the tree is in a state the operation cannot work with,
    /// e.g. a parent without a child map.
    #[error("tree inconsistency: {message}")]
    Inconsistent {
        /// Description of the inconsistency.
        message: String,
    },

    /// A resource content payload could not be serialized or parsed.
    #[error("content error: {0}")]
    Content(#[from] serde_json::Error),

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The transaction manager is closed.
    #[error("transaction manager is closed")]
    Closed,
}

impl TreeError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Creates a tree inconsistency error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
