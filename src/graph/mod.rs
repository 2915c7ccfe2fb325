//! Commit graph manager.
//!
//! Creates commits, validates parent linkage and answers history queries.
//! Edges only ever point at commits that already exist in the same
//! repository, so the graph is a DAG by construction.

mod commit;
mod history;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::DEFAULT_MAX_ANCESTRY_LIMIT;
use crate::content::ContentStore;
use crate::error::{VcsError, VcsResult};
use crate::events::{DomainEvent, EventSink};
use crate::repository::Repository;
use crate::storage::Store;
use crate::types::{ActorId, CommitId, ContentHash, FilePath, RepositoryId};

pub use commit::{ChangeType, Commit, FileChange};
pub use history::Ancestry;

/// Commit graph manager. Cheap to clone; all state lives in the store.
#[derive(Clone)]
pub struct CommitGraph {
    store: Arc<dyn Store>,
    content: Arc<dyn ContentStore>,
    events: Arc<dyn EventSink>,
    max_ancestry_limit: usize,
}

impl CommitGraph {
    pub fn new(
        store: Arc<dyn Store>,
        content: Arc<dyn ContentStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            content,
            events,
            max_ancestry_limit: DEFAULT_MAX_ANCESTRY_LIMIT,
        }
    }

    /// cap applied to every `list_ancestry` limit
    pub fn with_max_ancestry_limit(mut self, limit: usize) -> Self {
        self.max_ancestry_limit = limit;
        self
    }

    pub(crate) fn require_repository(&self, id: &RepositoryId) -> VcsResult<Repository> {
        self.store
            .repository(id)?
            .ok_or_else(|| VcsError::RepositoryNotFound(id.clone()))
    }

    /// Create a new immutable commit.
    ///
    /// `parent_ids` may only be empty while the repository has no branches;
    /// after that every commit must extend existing history.
    pub fn create_commit(
        &self,
        repository_id: &RepositoryId,
        parent_ids: Vec<CommitId>,
        message: impl Into<String>,
        author_id: ActorId,
        changes: Vec<FileChange>,
    ) -> VcsResult<Arc<Commit>> {
        self.require_repository(repository_id)?;

        let mut unique = HashSet::with_capacity(parent_ids.len());
        let mut parents = Vec::with_capacity(parent_ids.len());
        for id in &parent_ids {
            if !unique.insert(id) {
                return Err(VcsError::DuplicateParent(id.clone()));
            }
            let parent = self
                .store
                .commit(repository_id, id)?
                .ok_or_else(|| VcsError::UnknownParent(id.clone()))?;
            parents.push(parent);
        }

        if parents.is_empty() && self.store.has_branches(repository_id)? {
            return Err(VcsError::ParentRequired(repository_id.clone()));
        }

        self.validate_changes(&changes)?;

        let timestamp = parents
            .iter()
            .map(|p| p.timestamp)
            .fold(Utc::now(), |latest, t| latest.max(t));
        let generation = parents.iter().map(|p| p.generation).max().unwrap_or(0) + 1;

        let commit = self.store.insert_commit(Commit {
            id: CommitId::generate(),
            repository_id: repository_id.clone(),
            message: message.into(),
            author_id,
            timestamp,
            parent_ids,
            generation,
            changes,
        })?;

        info!(
            repository = %repository_id,
            commit = %commit.id,
            parents = commit.parent_ids.len(),
            summary = commit.summary(),
            changes = commit.changes.len(),
            "created commit"
        );
        self.events.emit(DomainEvent::CommitCreated {
            repository_id: repository_id.clone(),
            commit_id: commit.id.clone(),
            parent_ids: commit.parent_ids.clone(),
            author_id: commit.author_id.clone(),
        });

        Ok(commit)
    }

    /// paths unique, hashes present exactly when required and resolvable
    fn validate_changes(&self, changes: &[FileChange]) -> VcsResult<()> {
        let mut paths = HashSet::with_capacity(changes.len());
        for change in changes {
            if !paths.insert(&change.path) {
                return Err(VcsError::DuplicatePath(change.path.clone()));
            }
        }

        for change in changes {
            match change.change_type {
                ChangeType::Deleted => {
                    if change.content_hash.is_some() {
                        return Err(VcsError::UnexpectedContentHash(change.path.clone()));
                    }
                }
                ChangeType::Added | ChangeType::Modified => {
                    let hash = change
                        .content_hash
                        .as_ref()
                        .ok_or_else(|| VcsError::MissingContentHash(change.path.clone()))?;
                    if !self.content.contains(hash)? {
                        return Err(VcsError::UnknownContent {
                            path: change.path.clone(),
                            hash: hash.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get_commit(&self, repository_id: &RepositoryId, id: &CommitId) -> VcsResult<Arc<Commit>> {
        self.store
            .commit(repository_id, id)?
            .ok_or_else(|| VcsError::CommitNotFound(id.clone()))
    }

    /// Lazy ancestry walk starting at (and including) `commit_id`.
    pub fn ancestry(&self, repository_id: &RepositoryId, commit_id: &CommitId) -> VcsResult<Ancestry> {
        let start = self.get_commit(repository_id, commit_id)?;
        Ok(Ancestry::new(Arc::clone(&self.store), start))
    }

    /// Up to `limit` commits of history, most recent first, each commit once.
    pub fn list_ancestry(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        limit: usize,
    ) -> VcsResult<Vec<Arc<Commit>>> {
        let limit = limit.min(self.max_ancestry_limit);
        let commits = self
            .ancestry(repository_id, commit_id)?
            .take(limit)
            .collect::<VcsResult<Vec<_>>>()?;
        debug!(
            repository = %repository_id,
            start = %commit_id,
            returned = commits.len(),
            "listed ancestry"
        );
        Ok(commits)
    }

    /// Every live path at `commit_id` with its content hash.
    ///
    /// The nearest record for a path wins; a deletion hides the path and
    /// every older record of it.
    pub fn list_paths_as_of(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
    ) -> VcsResult<BTreeMap<FilePath, ContentHash>> {
        let mut resolved: HashMap<FilePath, Option<ContentHash>> = HashMap::new();
        let mut walked = 0usize;

        for commit in self.ancestry(repository_id, commit_id)? {
            let commit = commit?;
            walked += 1;
            for change in &commit.changes {
                resolved
                    .entry(change.path.clone())
                    .or_insert_with(|| match change.change_type {
                        ChangeType::Deleted => None,
                        ChangeType::Added | ChangeType::Modified => change.content_hash.clone(),
                    });
            }
        }

        let live: BTreeMap<FilePath, ContentHash> = resolved
            .into_iter()
            .filter_map(|(path, hash)| hash.map(|h| (path, h)))
            .collect();
        debug!(
            repository = %repository_id,
            commit = %commit_id,
            walked,
            paths = live.len(),
            "resolved paths"
        );
        Ok(live)
    }

    /// Content hash of a single path at `commit_id`, `None` if not live.
    ///
    /// Stops at the nearest commit that touched the path.
    pub fn file_at(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        path: &FilePath,
    ) -> VcsResult<Option<ContentHash>> {
        for commit in self.ancestry(repository_id, commit_id)? {
            let commit = commit?;
            if let Some(change) = commit.change_for(path) {
                return Ok(match change.change_type {
                    ChangeType::Deleted => None,
                    ChangeType::Added | ChangeType::Modified => change.content_hash.clone(),
                });
            }
        }
        Ok(None)
    }

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own
    /// ancestor).
    ///
    /// Generations strictly decrease along parent edges, so branches of the
    /// walk below the ancestor's generation are pruned.
    pub fn is_ancestor(
        &self,
        repository_id: &RepositoryId,
        ancestor: &CommitId,
        descendant: &CommitId,
    ) -> VcsResult<bool> {
        let target = self.get_commit(repository_id, ancestor)?;
        let start = self.get_commit(repository_id, descendant)?;

        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(commit) = stack.pop() {
            if commit.id == target.id {
                return Ok(true);
            }
            if commit.generation <= target.generation {
                continue;
            }
            for parent_id in &commit.parent_ids {
                if seen.insert(parent_id.clone()) {
                    stack.push(self.get_commit(repository_id, parent_id)?);
                }
            }
        }
        Ok(false)
    }
}
