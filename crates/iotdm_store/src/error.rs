//! Error types for backing store operations.

use thiserror::Error;

/// Result type for backing store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during backing store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Kind of record (resource, cse, child edge, ...).
        kind: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// A parent has no child list, so no edge can be read or written under it.
    #[error("no child list for parent {parent_id}")]
    MissingChildList {
        /// The parent resource id.
        parent_id: String,
    },

    /// The store refused or failed the write.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The store failed to read.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Stored data could not be interpreted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Creates a missing child list error.
    pub fn missing_child_list(parent_id: impl Into<String>) -> Self {
        Self::MissingChildList {
            parent_id: parent_id.into(),
        }
    }

    /// Returns true if this error means the record simply is not there.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MissingChildList { .. })
    }
}
