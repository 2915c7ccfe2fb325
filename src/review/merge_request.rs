//! Merge request and review records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActorId, BranchName, CommitId, MergeRequestId, RepositoryId};

/// Lifecycle state of a merge request. `Merged` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeRequestStatus {
    Open,
    Merged,
    Closed,
}

impl MergeRequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MergeRequestStatus::Open)
    }

    /// only Open -> Merged and Open -> Closed exist
    pub fn can_transition_to(self, next: MergeRequestStatus) -> bool {
        matches!(
            (self, next),
            (MergeRequestStatus::Open, MergeRequestStatus::Merged)
                | (MergeRequestStatus::Open, MergeRequestStatus::Closed)
        )
    }
}

impl fmt::Display for MergeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeRequestStatus::Open => write!(f, "open"),
            MergeRequestStatus::Merged => write!(f, "merged"),
            MergeRequestStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A reviewer's current opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pending,
    Approved,
    ChangesRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer_id: ActorId,
    pub verdict: Verdict,
    pub updated_at: DateTime<Utc>,
}

/// A request to merge `source_branch` into `target_branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: MergeRequestId,
    pub repository_id: RepositoryId,
    pub title: String,
    pub source_branch: BranchName,
    pub target_branch: BranchName,
    pub status: MergeRequestStatus,
    pub creator_id: ActorId,
    /// one entry per reviewer, in the order they first reviewed
    pub reviews: Vec<Review>,
    pub source_head_at_open: CommitId,
    pub target_head_at_open: CommitId,
    pub merge_commit_id: Option<CommitId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// bumped on every write, used for optimistic updates
    pub version: u64,
}

impl MergeRequest {
    pub fn is_open(&self) -> bool {
        self.status == MergeRequestStatus::Open
    }

    /// check if `branch` is the source or the target
    pub fn references(&self, branch: &BranchName) -> bool {
        &self.source_branch == branch || &self.target_branch == branch
    }

    pub fn review_by(&self, reviewer: &ActorId) -> Option<&Review> {
        self.reviews.iter().find(|r| &r.reviewer_id == reviewer)
    }

    /// Insert or replace the reviewer's verdict, keeping first-review order.
    pub(crate) fn upsert_review(&mut self, reviewer: ActorId, verdict: Verdict, at: DateTime<Utc>) {
        match self.reviews.iter_mut().find(|r| r.reviewer_id == reviewer) {
            Some(review) => {
                review.verdict = verdict;
                review.updated_at = at;
            }
            None => self.reviews.push(Review {
                reviewer_id: reviewer,
                verdict,
                updated_at: at,
            }),
        }
    }

    pub fn count_verdict(&self, verdict: Verdict) -> usize {
        self.reviews.iter().filter(|r| r.verdict == verdict).count()
    }
}
