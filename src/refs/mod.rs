//!  Branch registry.
//!
//!  Branches are named, mutable pointers to commits. This module handles:
//! - branch creation from any existing commit
//! - compare-and-swap head advancement (fast-forward only)
//! - guarded deletion
//!
//! `advance_branch` is the only contended operation in the core. Two callers
//! racing on the same expected head get exactly one winner; the loser sees
//! `StaleBranchHead` and is expected to re-read the head and retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{VcsError, VcsResult};
use crate::events::{DomainEvent, EventSink};
use crate::graph::CommitGraph;
use crate::storage::{BranchDeletion, HeadSwap, InsertOutcome, Store};
use crate::types::{BranchName, CommitId, RepositoryId};

/// A named pointer to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub repository_id: RepositoryId,
    pub name: BranchName,
    pub head: CommitId,
    pub updated_at: DateTime<Utc>,
}

/// Manages branches of every repository in a store.
#[derive(Clone)]
pub struct BranchRegistry {
    store: Arc<dyn Store>,
    graph: CommitGraph,
    events: Arc<dyn EventSink>,
}

impl BranchRegistry {
    pub fn new(store: Arc<dyn Store>, graph: CommitGraph, events: Arc<dyn EventSink>) -> Self {
        Self { store, graph, events }
    }

    /// Create a new branch pointing to an existing commit.
    pub fn create_branch(
        &self,
        repository_id: &RepositoryId,
        name: &BranchName,
        source_commit_id: &CommitId,
    ) -> VcsResult<Branch> {
        self.graph.require_repository(repository_id)?;
        if self.store.branch(repository_id, name)?.is_some() {
            return Err(VcsError::DuplicateBranchName(name.clone()));
        }
        let commit = self.graph.get_commit(repository_id, source_commit_id)?;

        let branch = Branch {
            repository_id: repository_id.clone(),
            name: name.clone(),
            head: commit.id.clone(),
            updated_at: Utc::now(),
        };
        match self.store.insert_branch(branch.clone())? {
            InsertOutcome::Inserted => {}
            // lost a race with a concurrent create of the same name
            InsertOutcome::AlreadyExists => return Err(VcsError::DuplicateBranchName(name.clone())),
        }

        info!(repository = %repository_id, branch = %name, head = %branch.head, "created branch");
        self.events.emit(DomainEvent::BranchCreated {
            repository_id: repository_id.clone(),
            branch: name.clone(),
            head: branch.head.clone(),
        });
        Ok(branch)
    }

    /// Resolve a branch by name.
    pub fn get_branch(&self, repository_id: &RepositoryId, name: &BranchName) -> VcsResult<Branch> {
        self.store
            .branch(repository_id, name)?
            .ok_or_else(|| VcsError::BranchNotFound(name.clone()))
    }

    /// All branches of a repository, sorted by name.
    pub fn list_branches(&self, repository_id: &RepositoryId) -> VcsResult<Vec<Branch>> {
        self.graph.require_repository(repository_id)?;
        Ok(self.store.branches(repository_id)?)
    }

    /// Move a branch to `new_head_commit_id` if it still points at
    /// `expected_current_head`.
    ///
    /// The new head must list the expected head among its parents.
    pub fn advance_branch(
        &self,
        repository_id: &RepositoryId,
        name: &BranchName,
        expected_current_head: &CommitId,
        new_head_commit_id: &CommitId,
    ) -> VcsResult<Branch> {
        self.get_branch(repository_id, name)?;
        let new_head = self.graph.get_commit(repository_id, new_head_commit_id)?;
        if !new_head.has_parent(expected_current_head) {
            return Err(VcsError::NotFastForward {
                branch: name.clone(),
                expected: expected_current_head.clone(),
                new_head: new_head_commit_id.clone(),
            });
        }

        let swap = self.store.compare_and_swap_head(
            repository_id,
            name,
            expected_current_head,
            new_head_commit_id,
            Utc::now(),
        )?;
        match swap {
            HeadSwap::Swapped(branch) => {
                info!(
                    repository = %repository_id,
                    branch = %name,
                    from = %expected_current_head,
                    to = %branch.head,
                    "advanced branch"
                );
                self.events.emit(DomainEvent::BranchAdvanced {
                    repository_id: repository_id.clone(),
                    branch: name.clone(),
                    previous_head: expected_current_head.clone(),
                    new_head: branch.head.clone(),
                });
                Ok(branch)
            }
            HeadSwap::Stale { actual } => {
                warn!(
                    repository = %repository_id,
                    branch = %name,
                    expected = %expected_current_head,
                    actual = %actual,
                    "branch head moved, rejecting update"
                );
                Err(VcsError::StaleBranchHead {
                    branch: name.clone(),
                    expected: expected_current_head.clone(),
                    actual,
                })
            }
            HeadSwap::Missing => Err(VcsError::BranchNotFound(name.clone())),
        }
    }

    /// Delete a branch that is neither the default nor part of an open
    /// merge request.
    pub fn delete_branch(&self, repository_id: &RepositoryId, name: &BranchName) -> VcsResult<()> {
        let repository = self.graph.require_repository(repository_id)?;
        if repository.is_default_branch(name) {
            return Err(VcsError::CannotDeleteDefaultBranch(name.clone()));
        }

        match self.store.delete_branch_if_unreferenced(repository_id, name)? {
            BranchDeletion::Deleted(branch) => {
                info!(repository = %repository_id, branch = %name, head = %branch.head, "deleted branch");
                self.events.emit(DomainEvent::BranchDeleted {
                    repository_id: repository_id.clone(),
                    branch: name.clone(),
                });
                Ok(())
            }
            BranchDeletion::Referenced(open) => {
                debug!(repository = %repository_id, branch = %name, open = open.len(), "branch still referenced");
                Err(VcsError::BranchHasOpenMergeRequests {
                    branch: name.clone(),
                    open,
                })
            }
            BranchDeletion::Missing => Err(VcsError::BranchNotFound(name.clone())),
        }
    }
}
