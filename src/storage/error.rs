//! Storage layer error types
//!
//! These are failures of the persistence backend itself. Domain validation
//! failures live in [`crate::error::VcsError`], which wraps these.

use thiserror::Error;

/// the main error type for persistence operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying git object database
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// the repository namespace does not exist in this store
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// a record with this key was already written
    #[error("duplicate {kind} key: {key}")]
    DuplicateKey { kind: &'static str, key: String },

    /// data integrity check failed
    #[error("corrupted {what}: {reason}")]
    Corrupted { what: String, reason: String },

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the backend itself is unhealthy
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, StorageError::Git(_) | StorageError::Io(_))
    }

    /// check if this error points at inconsistent persisted data
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            StorageError::DuplicateKey { .. } | StorageError::Corrupted { .. }
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
