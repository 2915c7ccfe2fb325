use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{render_merge_message, DEFAULT_MERGE_MESSAGE};
use crate::error::{VcsError, VcsResult};
use crate::events::{DomainEvent, EventSink};
use crate::graph::CommitGraph;
use crate::refs::BranchRegistry;
use crate::review::{MergePolicy, MergeReadiness, MergeRequest, MergeRequestStatus, Verdict};
use crate::storage::{MergeCompletion, MergeRequestInsert, Store, VersionedWrite};
use crate::types::{ActorId, BranchName, MergeRequestId, RepositoryId};

/// Drives merge requests through their lifecycle.
#[derive(Clone)]
pub struct ReviewEngine {
    store: Arc<dyn Store>,
    graph: CommitGraph,
    branches: BranchRegistry,
    events: Arc<dyn EventSink>,
    policy: MergePolicy,
    merge_message_template: String,
}

impl ReviewEngine {
    pub fn new(
        store: Arc<dyn Store>,
        graph: CommitGraph,
        branches: BranchRegistry,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            graph,
            branches,
            events,
            policy: MergePolicy::default(),
            merge_message_template: DEFAULT_MERGE_MESSAGE.to_string(),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_merge_message_template(mut self, template: impl Into<String>) -> Self {
        self.merge_message_template = template.into();
        self
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Open a merge request from `source` into `target`.
    ///
    /// Both branches must exist and differ. Their current heads are recorded
    /// on the request.
    pub fn create_merge_request(
        &self,
        repository_id: &RepositoryId,
        title: impl Into<String>,
        source: &BranchName,
        target: &BranchName,
        creator_id: ActorId,
    ) -> VcsResult<MergeRequest> {
        self.graph.require_repository(repository_id)?;
        if source == target {
            return Err(VcsError::SameSourceAndTarget(source.clone()));
        }
        let source_branch = self.branches.get_branch(repository_id, source)?;
        let target_branch = self.branches.get_branch(repository_id, target)?;

        let now = Utc::now();
        let merge_request = MergeRequest {
            id: MergeRequestId::generate(),
            repository_id: repository_id.clone(),
            title: title.into(),
            source_branch: source.clone(),
            target_branch: target.clone(),
            status: MergeRequestStatus::Open,
            creator_id,
            reviews: Vec::new(),
            source_head_at_open: source_branch.head,
            target_head_at_open: target_branch.head,
            merge_commit_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        match self.store.insert_merge_request(merge_request.clone())? {
            MergeRequestInsert::Inserted => {}
            // a branch was deleted between the lookup and the insert
            MergeRequestInsert::MissingBranch(name) => return Err(VcsError::BranchNotFound(name)),
        }

        info!(
            repository = %repository_id,
            merge_request = %merge_request.id,
            source = %source,
            target = %target,
            "opened merge request"
        );
        self.events.emit(DomainEvent::MergeRequestOpened {
            repository_id: repository_id.clone(),
            merge_request_id: merge_request.id.clone(),
            source_branch: source.clone(),
            target_branch: target.clone(),
        });
        Ok(merge_request)
    }

    pub fn get_merge_request(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
    ) -> VcsResult<MergeRequest> {
        self.graph.require_repository(repository_id)?;
        self.store
            .merge_request(repository_id, id)?
            .ok_or_else(|| VcsError::MergeRequestNotFound(id.clone()))
    }

    /// Merge requests of a repository, oldest first, optionally filtered by
    /// status.
    pub fn list_merge_requests(
        &self,
        repository_id: &RepositoryId,
        status: Option<MergeRequestStatus>,
    ) -> VcsResult<Vec<MergeRequest>> {
        self.graph.require_repository(repository_id)?;
        let mut merge_requests = self.store.merge_requests(repository_id)?;
        if let Some(status) = status {
            merge_requests.retain(|mr| mr.status == status);
        }
        Ok(merge_requests)
    }

    /// Review tally of a merge request against the configured policy.
    pub fn readiness(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
    ) -> VcsResult<MergeReadiness> {
        let merge_request = self.get_merge_request(repository_id, id)?;
        Ok(self.policy.evaluate(&merge_request))
    }

    /// Record or replace a reviewer's verdict on an open merge request.
    pub fn set_review_verdict(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        reviewer_id: ActorId,
        verdict: Verdict,
    ) -> VcsResult<MergeRequest> {
        let updated = self.update_open(repository_id, id, |mr| {
            mr.upsert_review(reviewer_id.clone(), verdict, Utc::now());
        })?;

        info!(
            repository = %repository_id,
            merge_request = %id,
            reviewer = %reviewer_id,
            verdict = ?verdict,
            "review updated"
        );
        self.events.emit(DomainEvent::ReviewUpdated {
            repository_id: repository_id.clone(),
            merge_request_id: id.clone(),
            reviewer_id,
            verdict,
        });
        Ok(updated)
    }

    /// Merge the source branch into the target branch.
    ///
    /// Creates a commit whose parents are the current target head and the
    /// current source head, then moves the target to it and marks the request
    /// merged in one store write. If the target moves in between the merge
    /// fails with `MergeConflict` and the caller may retry; if the request is
    /// closed in between, nothing is written.
    pub fn merge_merge_request(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        merger_id: ActorId,
    ) -> VcsResult<MergeRequest> {
        let merge_request = self.get_merge_request(repository_id, id)?;
        self.check_mergeable(&merge_request)?;

        let source = self.branches.get_branch(repository_id, &merge_request.source_branch)?;
        let target = self.branches.get_branch(repository_id, &merge_request.target_branch)?;
        if source.head == target.head
            || self.graph.is_ancestor(repository_id, &source.head, &target.head)?
        {
            return Err(VcsError::MergeBlocked {
                id: id.clone(),
                reason: format!("{} is already up to date with {}", target.name, source.name),
            });
        }

        let message = render_merge_message(&self.merge_message_template, &source.name, &target.name);
        let merge_commit = self.graph.create_commit(
            repository_id,
            vec![target.head.clone(), source.head.clone()],
            message,
            merger_id.clone(),
            Vec::new(),
        )?;

        let mut current = merge_request;
        let (branch, merged) = loop {
            let expected_version = current.version;
            let mut next = current;
            next.status = MergeRequestStatus::Merged;
            next.merge_commit_id = Some(merge_commit.id.clone());
            next.version = expected_version + 1;
            next.updated_at = Utc::now();

            match self
                .store
                .complete_merge(next, expected_version, &target.head, Utc::now())?
            {
                MergeCompletion::Completed { branch, merge_request } => break (branch, merge_request),
                MergeCompletion::StaleRecord(latest) => {
                    debug!(
                        repository = %repository_id,
                        merge_request = %id,
                        expected_version,
                        actual_version = latest.version,
                        "merge request changed during merge, rechecking"
                    );
                    // reviews may have changed, and a close wins over the merge
                    self.check_mergeable(&latest)?;
                    current = latest;
                }
                MergeCompletion::StaleHead { actual } => {
                    warn!(
                        repository = %repository_id,
                        merge_request = %id,
                        branch = %target.name,
                        expected = %target.head,
                        actual = %actual,
                        "target branch moved during merge"
                    );
                    return Err(VcsError::MergeConflict {
                        id: id.clone(),
                        branch: target.name,
                    });
                }
                MergeCompletion::MissingBranch => return Err(VcsError::BranchNotFound(target.name)),
                MergeCompletion::MissingMergeRequest => {
                    return Err(VcsError::MergeRequestNotFound(id.clone()))
                }
            }
        };

        info!(
            repository = %repository_id,
            merge_request = %id,
            commit = %merge_commit.id,
            merger = %merger_id,
            "merged merge request"
        );
        self.events.emit(DomainEvent::BranchAdvanced {
            repository_id: repository_id.clone(),
            branch: branch.name,
            previous_head: target.head,
            new_head: branch.head,
        });
        self.events.emit(DomainEvent::MergeRequestMerged {
            repository_id: repository_id.clone(),
            merge_request_id: id.clone(),
            merge_commit_id: merge_commit.id.clone(),
        });
        Ok(merged)
    }

    /// Open, allowed to become merged, and passing the policy.
    fn check_mergeable(&self, merge_request: &MergeRequest) -> VcsResult<()> {
        if !merge_request.status.can_transition_to(MergeRequestStatus::Merged) {
            return Err(VcsError::MergeRequestNotOpen {
                id: merge_request.id.clone(),
                status: merge_request.status,
            });
        }
        if let Some(reason) = self.policy.evaluate(merge_request).blocking_reason {
            debug!(
                repository = %merge_request.repository_id,
                merge_request = %merge_request.id,
                reason = %reason,
                "merge blocked by policy"
            );
            return Err(VcsError::MergeBlocked {
                id: merge_request.id.clone(),
                reason,
            });
        }
        Ok(())
    }

    /// Close an open merge request without merging.
    pub fn close_merge_request(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        actor_id: ActorId,
    ) -> VcsResult<MergeRequest> {
        let closed = self.update_open(repository_id, id, |mr| {
            mr.status = MergeRequestStatus::Closed;
        })?;

        info!(repository = %repository_id, merge_request = %id, actor = %actor_id, "closed merge request");
        self.events.emit(DomainEvent::MergeRequestClosed {
            repository_id: repository_id.clone(),
            merge_request_id: id.clone(),
        });
        Ok(closed)
    }

    /// Apply `apply` to an open merge request with optimistic versioning.
    ///
    /// A lost race re-reads the record and applies again; a record that
    /// became terminal in the meantime fails with `MergeRequestNotOpen`.
    fn update_open<F>(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        mut apply: F,
    ) -> VcsResult<MergeRequest>
    where
        F: FnMut(&mut MergeRequest),
    {
        let mut current = self.get_merge_request(repository_id, id)?;
        loop {
            if current.status.is_terminal() {
                return Err(VcsError::MergeRequestNotOpen {
                    id: id.clone(),
                    status: current.status,
                });
            }

            let expected_version = current.version;
            let mut next = current;
            apply(&mut next);
            next.version = expected_version + 1;
            next.updated_at = Utc::now();

            match self.store.replace_merge_request(next, expected_version)? {
                VersionedWrite::Written(written) => return Ok(written),
                VersionedWrite::Stale(latest) => {
                    debug!(
                        repository = %repository_id,
                        merge_request = %id,
                        expected_version,
                        actual_version = latest.version,
                        "merge request changed concurrently, reapplying"
                    );
                    current = latest;
                }
                VersionedWrite::Missing => return Err(VcsError::MergeRequestNotFound(id.clone())),
            }
        }
    }
}
