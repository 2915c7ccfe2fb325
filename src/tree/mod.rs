//! Tree materializer.
//!
//! Directories are never stored. A folder listing is derived from the flat
//! set of live paths at a commit: direct children become file nodes, and
//! every deeper path contributes exactly one directory node for the
//! subdirectory it lives under.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VcsResult;
use crate::graph::CommitGraph;
use crate::types::{CommitId, ContentHash, FilePath, RepositoryId};

/// kind of a derived tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    // declared first so directories sort ahead of files
    Directory,
    File,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Directory => write!(f, "directory"),
            NodeKind::File => write!(f, "file"),
        }
    }
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// full repository-relative path
    pub path: String,
    /// last path segment
    pub name: String,
    pub kind: NodeKind,
    /// set for files only
    pub content_hash: Option<ContentHash>,
}

impl TreeNode {
    fn file(path: &FilePath, hash: &ContentHash) -> Self {
        Self {
            path: path.as_str().to_string(),
            name: path.file_name().to_string(),
            kind: NodeKind::File,
            content_hash: Some(hash.clone()),
        }
    }

    fn directory(path: String) -> Self {
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            path,
            name,
            kind: NodeKind::Directory,
            content_hash: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Strip surrounding slashes; the empty string is the root.
fn normalize_folder(folder_path: &str) -> String {
    folder_path.replace('\\', "/").trim_matches('/').to_string()
}

/// Derive the listing of `folder_path` from a flat path map.
///
/// Directories come first, then files; each group is ordered by full path.
pub fn materialize(paths: &BTreeMap<FilePath, ContentHash>, folder_path: &str) -> Vec<TreeNode> {
    let folder = normalize_folder(folder_path);
    let (prefix, path_depth) = if folder.is_empty() {
        (String::new(), 0)
    } else {
        (format!("{}/", folder), folder.split('/').count())
    };

    let mut files = Vec::new();
    let mut directories = BTreeSet::new();

    for (path, hash) in paths {
        if !path.as_str().starts_with(&prefix) {
            continue;
        }
        let depth = path.depth();
        if depth == path_depth + 1 {
            files.push(TreeNode::file(path, hash));
        } else if depth > path_depth + 1 {
            let subdir = path.segments().take(path_depth + 1).collect::<Vec<_>>().join("/");
            directories.insert(subdir);
        }
    }

    let mut nodes: Vec<TreeNode> = directories.into_iter().map(TreeNode::directory).collect();
    nodes.extend(files);
    nodes.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.path.cmp(&b.path)));
    nodes
}

/// Answers "what does this folder look like at this commit".
#[derive(Clone)]
pub struct TreeMaterializer {
    graph: CommitGraph,
}

impl TreeMaterializer {
    pub fn new(graph: CommitGraph) -> Self {
        Self { graph }
    }

    /// Listing of `folder_path` (empty for the root) at `commit_id`.
    ///
    /// An unknown folder yields an empty listing, same as an empty one; use
    /// [`Self::entry_kind`] to tell them apart.
    pub fn get_tree(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        folder_path: &str,
    ) -> VcsResult<Vec<TreeNode>> {
        let paths = self.graph.list_paths_as_of(repository_id, commit_id)?;
        let nodes = materialize(&paths, folder_path);
        debug!(
            repository = %repository_id,
            commit = %commit_id,
            folder = folder_path,
            entries = nodes.len(),
            "materialized tree"
        );
        Ok(nodes)
    }

    /// What lives at `path` at `commit_id`, if anything. The root is always
    /// a directory.
    pub fn entry_kind(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        path: &str,
    ) -> VcsResult<Option<NodeKind>> {
        let paths = self.graph.list_paths_as_of(repository_id, commit_id)?;
        let target = normalize_folder(path);
        if target.is_empty() {
            return Ok(Some(NodeKind::Directory));
        }

        let prefix = format!("{}/", target);
        let kind = paths.keys().find_map(|p| {
            if p.as_str() == target {
                Some(NodeKind::File)
            } else if p.as_str().starts_with(&prefix) {
                Some(NodeKind::Directory)
            } else {
                None
            }
        });
        Ok(kind)
    }
}
