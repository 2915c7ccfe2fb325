//! Error kinds of the version-control core.
//!
//! Every validation failure is returned to the caller as a typed error.
//! Nothing is retried inside the core; [`VcsError::is_retryable`] tells the
//! caller which failures are worth retrying with fresh state.

use thiserror::Error;

use crate::review::MergeRequestStatus;
use crate::storage::StorageError;
use crate::types::{
    BranchName, CommitId, ContentHash, FilePath, InvalidNameError, MergeRequestId, RepositoryId,
};

/// Result type for core operations.
pub type VcsResult<T> = Result<T, VcsError>;

/// Errors produced by the commit graph, branch registry, tree materializer
/// and review engine.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("unknown parent commit: {0}")]
    UnknownParent(CommitId),

    #[error("parent commit listed twice: {0}")]
    DuplicateParent(CommitId),

    #[error("repository {0} already has history: a parent commit is required")]
    ParentRequired(RepositoryId),

    #[error("path appears more than once in a commit: {0}")]
    DuplicatePath(FilePath),

    #[error("content {hash} referenced by {path} is not stored")]
    UnknownContent { path: FilePath, hash: ContentHash },

    #[error("added or modified path {0} has no content hash")]
    MissingContentHash(FilePath),

    #[error("deleted path {0} must not carry a content hash")]
    UnexpectedContentHash(FilePath),

    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    #[error("repository not found: {0}")]
    RepositoryNotFound(RepositoryId),

    #[error("branch already exists: {0}")]
    DuplicateBranchName(BranchName),

    #[error("branch not found: {0}")]
    BranchNotFound(BranchName),

    /// Someone else advanced the branch first. Re-read the head and retry.
    #[error("stale head for branch {branch}: expected {expected}, found {actual}")]
    StaleBranchHead {
        branch: BranchName,
        expected: CommitId,
        actual: CommitId,
    },

    #[error("commit {new_head} does not descend directly from {expected} on branch {branch}")]
    NotFastForward {
        branch: BranchName,
        expected: CommitId,
        new_head: CommitId,
    },

    #[error("branch {branch} is referenced by {} open merge request(s)", .open.len())]
    BranchHasOpenMergeRequests {
        branch: BranchName,
        open: Vec<MergeRequestId>,
    },

    #[error("cannot delete default branch {0}")]
    CannotDeleteDefaultBranch(BranchName),

    #[error("merge request not found: {0}")]
    MergeRequestNotFound(MergeRequestId),

    #[error("merge request {id} is {status}")]
    MergeRequestNotOpen {
        id: MergeRequestId,
        status: MergeRequestStatus,
    },

    #[error("source and target branch are both {0}")]
    SameSourceAndTarget(BranchName),

    #[error("merge request {id} cannot be merged: {reason}")]
    MergeBlocked { id: MergeRequestId, reason: String },

    /// The target branch moved while merging. Re-read and retry.
    #[error("merge request {id} conflicts: target branch {branch} moved during merge")]
    MergeConflict { id: MergeRequestId, branch: BranchName },

    #[error("content not found: {0}")]
    ContentNotFound(ContentHash),

    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: InvalidNameError,
    },

    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranchName {
        name: String,
        reason: InvalidNameError,
    },

    #[error("invalid content hash '{value}': {reason}")]
    InvalidContentHash {
        value: String,
        reason: InvalidNameError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl VcsError {
    /// Expected races that a caller may retry after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VcsError::StaleBranchHead { .. } | VcsError::MergeConflict { .. }
        )
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VcsError::CommitNotFound(_)
                | VcsError::RepositoryNotFound(_)
                | VcsError::BranchNotFound(_)
                | VcsError::MergeRequestNotFound(_)
                | VcsError::ContentNotFound(_)
        )
    }

    /// check if this error is a conflict with existing state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            VcsError::DuplicateBranchName(_)
                | VcsError::StaleBranchHead { .. }
                | VcsError::BranchHasOpenMergeRequests { .. }
                | VcsError::MergeRequestNotOpen { .. }
                | VcsError::MergeConflict { .. }
        )
    }

    pub(crate) fn invalid_path(path: &str, reason: InvalidNameError) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_branch(name: &str, reason: InvalidNameError) -> Self {
        Self::InvalidBranchName {
            name: name.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_hash(value: &str, reason: InvalidNameError) -> Self {
        Self::InvalidContentHash {
            value: value.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let stale = VcsError::StaleBranchHead {
            branch: BranchName::main(),
            expected: CommitId::new("a"),
            actual: CommitId::new("b"),
        };
        assert!(stale.is_retryable());
        assert!(stale.is_conflict());

        let conflict = VcsError::MergeConflict {
            id: MergeRequestId::new("mr1"),
            branch: BranchName::main(),
        };
        assert!(conflict.is_retryable());

        let misuse = VcsError::UnknownParent(CommitId::new("ghost"));
        assert!(!misuse.is_retryable());
        assert!(!misuse.is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let not_open = VcsError::MergeRequestNotOpen {
            id: MergeRequestId::new("mr1"),
            status: MergeRequestStatus::Merged,
        };
        assert_eq!(not_open.to_string(), "merge request mr1 is merged");

        let referenced = VcsError::BranchHasOpenMergeRequests {
            branch: BranchName::new("feature").unwrap(),
            open: vec![MergeRequestId::new("a"), MergeRequestId::new("b")],
        };
        assert_eq!(
            referenced.to_string(),
            "branch feature is referenced by 2 open merge request(s)"
        );
    }

    #[test]
    fn test_storage_errors_convert() {
        let err: VcsError = StorageError::Internal("boom".to_string()).into();
        assert!(matches!(err, VcsError::Storage(_)));
        assert!(!err.is_not_found());
    }
}
