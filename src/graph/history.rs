//! Ancestry traversal.
//!
//! Parent ids always point at commits that existed before the child, so the
//! walk terminates without cycle detection. The visited set only prevents
//! re-walking shared history below diamond merges.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use crate::error::{VcsError, VcsResult};
use crate::graph::Commit;
use crate::storage::Store;
use crate::types::{CommitId, RepositoryId};

/// heap entry ordered by [`Commit::recency_cmp`]
struct Pending(Arc<Commit>);

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.recency_cmp(&other.0)
    }
}

/// Lazy walk over a commit and its ancestors, most recent first.
///
/// Each commit is yielded once. A missing parent ends the walk with an error.
pub struct Ancestry {
    store: Arc<dyn Store>,
    repository: RepositoryId,
    queue: BinaryHeap<Pending>,
    seen: HashSet<CommitId>,
    failed: bool,
}

impl Ancestry {
    pub(crate) fn new(store: Arc<dyn Store>, start: Arc<Commit>) -> Self {
        let repository = start.repository_id.clone();
        let mut seen = HashSet::new();
        seen.insert(start.id.clone());
        let mut queue = BinaryHeap::new();
        queue.push(Pending(start));

        Self {
            store,
            repository,
            queue,
            seen,
            failed: false,
        }
    }

    /// number of distinct commits discovered so far (yielded or queued)
    pub fn discovered(&self) -> usize {
        self.seen.len()
    }
}

impl Iterator for Ancestry {
    type Item = VcsResult<Arc<Commit>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let Pending(commit) = self.queue.pop()?;

        for parent_id in &commit.parent_ids {
            if !self.seen.insert(parent_id.clone()) {
                continue;
            }
            match self.store.commit(&self.repository, parent_id) {
                Ok(Some(parent)) => self.queue.push(Pending(parent)),
                Ok(None) => {
                    self.failed = true;
                    return Some(Err(VcsError::CommitNotFound(parent_id.clone())));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
        }

        Some(Ok(commit))
    }
}
