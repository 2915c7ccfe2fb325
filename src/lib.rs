//! vcscore - an embeddable version-control core
//!
//! This crate provides the storage-agnostic heart of a hosted version-control
//! service: content-addressed file bodies, an immutable commit graph, branches
//! with compare-and-swap heads, folder listings derived from flat paths, and a
//! merge request state machine with reviewer verdicts.
//!
//! Persistence sits behind the [`storage::Store`] trait and file bodies behind
//! [`content::ContentStore`]; in-memory implementations of both ship with the
//! crate, plus a git object database backed content store.
//!
//! # Example
//!
//! ```no_run
//! use vcscore::{ActorId, BranchName, FileChange, FilePath, VersionControl};
//!
//! let vcs = VersionControl::in_memory();
//! let repo = vcs.create_repository("demo", None).unwrap();
//! let hash = vcs.store_content(b"hello").unwrap();
//! let commit = vcs
//!     .commit_to_branch(
//!         &repo.id,
//!         &BranchName::main(),
//!         "initial commit",
//!         ActorId::new("alice"),
//!         vec![FileChange::added(FilePath::new("a/b.txt").unwrap(), hash)],
//!     )
//!     .unwrap();
//! let root = vcs.get_tree(&repo.id, &commit.id, "").unwrap();
//! assert_eq!(root[0].name, "a");
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod graph;
pub mod refs;
pub mod repository;
pub mod review;
pub mod storage;
pub mod tree;
pub mod types;
pub mod vcs;

pub use config::VcsConfig;
pub use error::{VcsError, VcsResult};
pub use graph::{ChangeType, Commit, FileChange};
pub use refs::Branch;
pub use repository::Repository;
pub use review::{MergePolicy, MergeRequest, MergeRequestStatus, Verdict};
pub use tree::{NodeKind, TreeNode};
pub use types::{ActorId, BranchName, CommitId, ContentHash, FilePath, MergeRequestId, RepositoryId};
pub use vcs::VersionControl;
