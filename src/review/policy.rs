//! Merge policy: what a merge request needs before it may be merged.
//!
//! The default policy requires nothing beyond the request being open.

use serde::{Deserialize, Serialize};

use crate::review::{MergeRequest, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// minimum number of approving reviews
    pub required_approvals: usize,
    /// any `ChangesRequested` verdict blocks the merge
    pub block_on_changes_requested: bool,
}

impl MergePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required_approvals(mut self, count: usize) -> Self {
        self.required_approvals = count;
        self
    }

    pub fn block_on_changes_requested(mut self, block: bool) -> Self {
        self.block_on_changes_requested = block;
        self
    }

    /// Evaluate a merge request's reviews against this policy.
    pub fn evaluate(&self, merge_request: &MergeRequest) -> MergeReadiness {
        let approvals = merge_request.count_verdict(Verdict::Approved);
        let changes_requested = merge_request.count_verdict(Verdict::ChangesRequested);
        let pending = merge_request.count_verdict(Verdict::Pending);

        let blocking_reason = if self.block_on_changes_requested && changes_requested > 0 {
            Some(format!("{} reviewer(s) requested changes", changes_requested))
        } else if approvals < self.required_approvals {
            Some(format!(
                "{} of {} required approval(s)",
                approvals, self.required_approvals
            ))
        } else {
            None
        };

        MergeReadiness {
            approvals,
            changes_requested,
            pending,
            blocking_reason,
        }
    }
}

/// Review tally for a merge request plus the policy verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReadiness {
    pub approvals: usize,
    pub changes_requested: usize,
    pub pending: usize,
    pub blocking_reason: Option<String>,
}

impl MergeReadiness {
    pub fn is_mergeable(&self) -> bool {
        self.blocking_reason.is_none()
    }
}
