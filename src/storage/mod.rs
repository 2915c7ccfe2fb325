//! persistence contract for the version-control core
//!
//! the core never talks to a database directly. It reads and writes through
//! the [`Store`] trait, which any backend (ordered key-value, relational,
//! log-structured) can implement as long as it honours two guarantees:
//!
//! - a commit and all of its file changes become visible as one unit
//! - branch heads are updated with a true compare-and-swap
//! - a merge moves its target head and marks the merge request merged together
//!
//! ```text
//!  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!  │ CommitGraph  │  │BranchRegistry│  │ ReviewEngine │
//!  └──────────────┘  └──────────────┘  └──────────────┘
//!          │                 │                 │
//!          └─────────────────┼─────────────────┘
//!                            ▼
//!                     ┌─────────────┐
//!                     │ dyn Store   │
//!                     └─────────────┘
//! ```
//!
//! [`MemoryStore`] is the bundled implementation.

mod error;
mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::graph::Commit;
use crate::refs::Branch;
use crate::repository::Repository;
use crate::review::MergeRequest;
use crate::types::{BranchName, CommitId, MergeRequestId, RepositoryId};

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// outcome of inserting a uniquely-named record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// outcome of a branch head compare-and-swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadSwap {
    /// the head matched and was replaced; carries the updated branch
    Swapped(Branch),
    /// the head had already moved on
    Stale { actual: CommitId },
    /// no such branch
    Missing,
}

/// outcome of a guarded branch delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchDeletion {
    Deleted(Branch),
    /// open merge requests still reference the branch
    Referenced(Vec<MergeRequestId>),
    Missing,
}

/// outcome of inserting a merge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeRequestInsert {
    Inserted,
    /// one of the referenced branches vanished before the insert
    MissingBranch(BranchName),
}

/// outcome of an optimistic merge request update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedWrite {
    Written(MergeRequest),
    /// someone else wrote first; carries the current record
    Stale(MergeRequest),
    Missing,
}

/// outcome of finishing a merge: head swap and merge request write together
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeCompletion {
    /// the target moved to the merge commit and the record was written
    Completed {
        branch: Branch,
        merge_request: MergeRequest,
    },
    /// the record changed since it was read; carries the current record
    StaleRecord(MergeRequest),
    /// the target head had already moved on
    StaleHead { actual: CommitId },
    MissingMergeRequest,
    MissingBranch,
}

/// The persistence contract the core is written against.
///
/// Implementations must be safe to share across threads. Every method is a
/// single atomic step from the caller's point of view.
pub trait Store: Send + Sync {
    fn insert_repository(&self, repository: Repository) -> StorageResult<InsertOutcome>;

    fn repository(&self, id: &RepositoryId) -> StorageResult<Option<Repository>>;

    /// Persist a commit together with its file changes.
    ///
    /// Either the whole commit becomes visible or none of it does.
    fn insert_commit(&self, commit: Commit) -> StorageResult<Arc<Commit>>;

    fn commit(&self, repository: &RepositoryId, id: &CommitId) -> StorageResult<Option<Arc<Commit>>>;

    fn insert_branch(&self, branch: Branch) -> StorageResult<InsertOutcome>;

    fn branch(&self, repository: &RepositoryId, name: &BranchName) -> StorageResult<Option<Branch>>;

    /// all branches of a repository, sorted by name
    fn branches(&self, repository: &RepositoryId) -> StorageResult<Vec<Branch>>;

    fn has_branches(&self, repository: &RepositoryId) -> StorageResult<bool>;

    /// Replace a branch head only if it still equals `expected`.
    fn compare_and_swap_head(
        &self,
        repository: &RepositoryId,
        name: &BranchName,
        expected: &CommitId,
        new_head: &CommitId,
        at: DateTime<Utc>,
    ) -> StorageResult<HeadSwap>;

    /// Delete a branch unless an open merge request references it.
    ///
    /// The reference check and the delete happen atomically.
    fn delete_branch_if_unreferenced(
        &self,
        repository: &RepositoryId,
        name: &BranchName,
    ) -> StorageResult<BranchDeletion>;

    /// Insert a merge request, atomically checking both branches still exist.
    fn insert_merge_request(&self, merge_request: MergeRequest) -> StorageResult<MergeRequestInsert>;

    fn merge_request(
        &self,
        repository: &RepositoryId,
        id: &MergeRequestId,
    ) -> StorageResult<Option<MergeRequest>>;

    /// all merge requests of a repository, oldest first
    fn merge_requests(&self, repository: &RepositoryId) -> StorageResult<Vec<MergeRequest>>;

    /// Replace a merge request if its stored version equals `expected_version`.
    fn replace_merge_request(
        &self,
        merge_request: MergeRequest,
        expected_version: u64,
    ) -> StorageResult<VersionedWrite>;

    /// Write a merged merge request and move its target branch to the merge
    /// commit as one atomic step.
    ///
    /// The record version is checked before the head; nothing is written
    /// unless both match.
    fn complete_merge(
        &self,
        merge_request: MergeRequest,
        expected_version: u64,
        expected_head: &CommitId,
        at: DateTime<Utc>,
    ) -> StorageResult<MergeCompletion>;
}
