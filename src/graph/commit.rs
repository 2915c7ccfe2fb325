//! Commit and file change records.
//!
//! A commit is an immutable node in the history graph. It carries the
//! changes it introduced, never a full snapshot; snapshots are derived by
//! walking ancestry (see [`super::CommitGraph::list_paths_as_of`]).

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActorId, CommitId, ContentHash, FilePath, RepositoryId};

/// the kind of change a commit records for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// One path touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: FilePath,
    pub change_type: ChangeType,
    /// present for added and modified paths
    pub content_hash: Option<ContentHash>,
    /// optional, only meaningful for modified paths
    pub previous_content_hash: Option<ContentHash>,
}

impl FileChange {
    pub fn added(path: FilePath, hash: ContentHash) -> Self {
        Self {
            path,
            change_type: ChangeType::Added,
            content_hash: Some(hash),
            previous_content_hash: None,
        }
    }

    pub fn modified(path: FilePath, hash: ContentHash, previous: Option<ContentHash>) -> Self {
        Self {
            path,
            change_type: ChangeType::Modified,
            content_hash: Some(hash),
            previous_content_hash: previous,
        }
    }

    pub fn deleted(path: FilePath) -> Self {
        Self {
            path,
            change_type: ChangeType::Deleted,
            content_hash: None,
            previous_content_hash: None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.change_type == ChangeType::Deleted
    }
}

/// An immutable commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub repository_id: RepositoryId,
    pub message: String,
    pub author_id: ActorId,
    /// never earlier than any parent's timestamp
    pub timestamp: DateTime<Utc>,
    pub parent_ids: Vec<CommitId>,
    /// 1 for a root commit, otherwise 1 + the highest parent generation
    pub generation: u64,
    pub changes: Vec<FileChange>,
}

impl Commit {
    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<&CommitId> {
        self.parent_ids.first()
    }

    pub fn has_parent(&self, id: &CommitId) -> bool {
        self.parent_ids.contains(id)
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }

    /// the change this commit records for `path`, if any
    pub fn change_for(&self, path: &FilePath) -> Option<&FileChange> {
        self.changes.iter().find(|change| &change.path == path)
    }

    /// Walk order: most recent first, then highest generation, then id.
    ///
    /// Because a commit's timestamp is clamped to its parents and its
    /// generation is strictly higher, a child always sorts before its parents.
    pub(crate) fn recency_cmp(&self, other: &Commit) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.generation.cmp(&other.generation))
            .then_with(|| self.id.cmp(&other.id))
    }
}
