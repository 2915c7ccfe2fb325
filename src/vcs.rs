//! High-level handle over the whole core.
//!
//! [`VersionControl`] wires the commit graph, branch registry, tree
//! materializer and review engine to one store, one content store and one
//! event sink. The components stay reachable for callers who want them
//! directly.

use std::sync::Arc;

use tracing::info;

use crate::config::VcsConfig;
use crate::content::{ContentStore, MemoryContentStore};
use crate::error::{VcsError, VcsResult};
use crate::events::{DomainEvent, EventSink, NullSink};
use crate::graph::{Commit, CommitGraph, FileChange};
use crate::refs::{Branch, BranchRegistry};
use crate::repository::Repository;
use crate::review::{MergeReadiness, MergeRequest, MergeRequestStatus, ReviewEngine, Verdict};
use crate::storage::{InsertOutcome, MemoryStore, StorageError, Store};
use crate::tree::{TreeMaterializer, TreeNode};
use crate::types::{ActorId, BranchName, CommitId, ContentHash, FilePath, MergeRequestId, RepositoryId};

/// The main handle. Cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct VersionControl {
    config: VcsConfig,
    store: Arc<dyn Store>,
    content: Arc<dyn ContentStore>,
    events: Arc<dyn EventSink>,
    graph: CommitGraph,
    branches: BranchRegistry,
    trees: TreeMaterializer,
    reviews: ReviewEngine,
}

impl VersionControl {
    pub fn new(
        store: Arc<dyn Store>,
        content: Arc<dyn ContentStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::with_config(VcsConfig::default(), store, content, events)
    }

    pub fn with_config(
        config: VcsConfig,
        store: Arc<dyn Store>,
        content: Arc<dyn ContentStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let graph = CommitGraph::new(Arc::clone(&store), Arc::clone(&content), Arc::clone(&events))
            .with_max_ancestry_limit(config.max_ancestry_limit);
        let branches = BranchRegistry::new(Arc::clone(&store), graph.clone(), Arc::clone(&events));
        let trees = TreeMaterializer::new(graph.clone());
        let reviews = ReviewEngine::new(
            Arc::clone(&store),
            graph.clone(),
            branches.clone(),
            Arc::clone(&events),
        )
        .with_policy(config.merge_policy.clone())
        .with_merge_message_template(config.merge_message_template.clone());

        Self {
            config,
            store,
            content,
            events,
            graph,
            branches,
            trees,
            reviews,
        }
    }

    /// Everything in memory, events discarded.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryContentStore::new()),
            Arc::new(NullSink),
        )
    }

    pub fn config(&self) -> &VcsConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    pub fn branches(&self) -> &BranchRegistry {
        &self.branches
    }

    pub fn trees(&self) -> &TreeMaterializer {
        &self.trees
    }

    pub fn reviews(&self) -> &ReviewEngine {
        &self.reviews
    }

    // =========================================================================
    // Repositories and content
    // =========================================================================

    /// Create an empty repository. Without an explicit default branch the
    /// configured one is used.
    pub fn create_repository(
        &self,
        name: impl Into<String>,
        default_branch: Option<BranchName>,
    ) -> VcsResult<Repository> {
        let default_branch = default_branch.unwrap_or_else(|| self.config.default_branch.clone());
        let repository = Repository::new(name, default_branch);

        match self.store.insert_repository(repository.clone())? {
            InsertOutcome::Inserted => {}
            InsertOutcome::AlreadyExists => {
                return Err(StorageError::DuplicateKey {
                    kind: "repository",
                    key: repository.id.to_string(),
                }
                .into())
            }
        }

        info!(
            repository = %repository.id,
            name = %repository.name,
            default_branch = %repository.default_branch,
            "created repository"
        );
        self.events.emit(DomainEvent::RepositoryCreated {
            repository_id: repository.id.clone(),
        });
        Ok(repository)
    }

    pub fn get_repository(&self, id: &RepositoryId) -> VcsResult<Repository> {
        self.graph.require_repository(id)
    }

    pub fn store_content(&self, bytes: &[u8]) -> VcsResult<ContentHash> {
        self.content.store(bytes)
    }

    pub fn resolve_content(&self, hash: &ContentHash) -> VcsResult<Vec<u8>> {
        self.content.resolve(hash)
    }

    // =========================================================================
    // Commits
    // =========================================================================

    pub fn create_commit(
        &self,
        repository_id: &RepositoryId,
        parent_ids: Vec<CommitId>,
        message: impl Into<String>,
        author_id: ActorId,
        changes: Vec<FileChange>,
    ) -> VcsResult<Arc<Commit>> {
        self.graph
            .create_commit(repository_id, parent_ids, message, author_id, changes)
    }

    pub fn get_commit(&self, repository_id: &RepositoryId, id: &CommitId) -> VcsResult<Arc<Commit>> {
        self.graph.get_commit(repository_id, id)
    }

    pub fn list_ancestry(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        limit: usize,
    ) -> VcsResult<Vec<Arc<Commit>>> {
        self.graph.list_ancestry(repository_id, commit_id, limit)
    }

    pub fn list_paths_as_of(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
    ) -> VcsResult<std::collections::BTreeMap<FilePath, ContentHash>> {
        self.graph.list_paths_as_of(repository_id, commit_id)
    }

    pub fn get_tree(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        folder_path: &str,
    ) -> VcsResult<Vec<TreeNode>> {
        self.trees.get_tree(repository_id, commit_id, folder_path)
    }

    /// Commit on top of a branch and move the branch to the new commit.
    ///
    /// On a repository without any branch this creates the root commit and
    /// the branch itself. A concurrent writer on the same branch makes this
    /// fail with `StaleBranchHead`; the orphaned commit is harmless.
    pub fn commit_to_branch(
        &self,
        repository_id: &RepositoryId,
        branch: &BranchName,
        message: impl Into<String>,
        author_id: ActorId,
        changes: Vec<FileChange>,
    ) -> VcsResult<Arc<Commit>> {
        self.graph.require_repository(repository_id)?;

        match self.store.branch(repository_id, branch)? {
            Some(current) => {
                let commit = self.graph.create_commit(
                    repository_id,
                    vec![current.head.clone()],
                    message,
                    author_id,
                    changes,
                )?;
                self.branches
                    .advance_branch(repository_id, branch, &current.head, &commit.id)?;
                Ok(commit)
            }
            None if !self.store.has_branches(repository_id)? => {
                let root = self
                    .graph
                    .create_commit(repository_id, Vec::new(), message, author_id, changes)?;
                self.branches.create_branch(repository_id, branch, &root.id)?;
                Ok(root)
            }
            None => Err(VcsError::BranchNotFound(branch.clone())),
        }
    }

    /// Body of `path` as of `commit_id`, or `None` when the file does not
    /// exist there.
    pub fn read_file(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
        path: &str,
    ) -> VcsResult<Option<Vec<u8>>> {
        let path: FilePath = path.parse()?;
        match self.graph.file_at(repository_id, commit_id, &path)? {
            Some(hash) => self.content.resolve(&hash).map(Some),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    pub fn create_branch(
        &self,
        repository_id: &RepositoryId,
        name: &BranchName,
        source_commit_id: &CommitId,
    ) -> VcsResult<Branch> {
        self.branches.create_branch(repository_id, name, source_commit_id)
    }

    pub fn get_branch(&self, repository_id: &RepositoryId, name: &BranchName) -> VcsResult<Branch> {
        self.branches.get_branch(repository_id, name)
    }

    pub fn list_branches(&self, repository_id: &RepositoryId) -> VcsResult<Vec<Branch>> {
        self.branches.list_branches(repository_id)
    }

    pub fn advance_branch(
        &self,
        repository_id: &RepositoryId,
        name: &BranchName,
        expected_current_head: &CommitId,
        new_head_commit_id: &CommitId,
    ) -> VcsResult<Branch> {
        self.branches
            .advance_branch(repository_id, name, expected_current_head, new_head_commit_id)
    }

    pub fn delete_branch(&self, repository_id: &RepositoryId, name: &BranchName) -> VcsResult<()> {
        self.branches.delete_branch(repository_id, name)
    }

    // =========================================================================
    // Merge requests
    // =========================================================================

    pub fn create_merge_request(
        &self,
        repository_id: &RepositoryId,
        title: impl Into<String>,
        source: &BranchName,
        target: &BranchName,
        creator_id: ActorId,
    ) -> VcsResult<MergeRequest> {
        self.reviews
            .create_merge_request(repository_id, title, source, target, creator_id)
    }

    pub fn get_merge_request(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
    ) -> VcsResult<MergeRequest> {
        self.reviews.get_merge_request(repository_id, id)
    }

    pub fn list_merge_requests(
        &self,
        repository_id: &RepositoryId,
        status: Option<MergeRequestStatus>,
    ) -> VcsResult<Vec<MergeRequest>> {
        self.reviews.list_merge_requests(repository_id, status)
    }

    pub fn set_review_verdict(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        reviewer_id: ActorId,
        verdict: Verdict,
    ) -> VcsResult<MergeRequest> {
        self.reviews
            .set_review_verdict(repository_id, id, reviewer_id, verdict)
    }

    pub fn readiness(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
    ) -> VcsResult<MergeReadiness> {
        self.reviews.readiness(repository_id, id)
    }

    pub fn merge_merge_request(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        merger_id: ActorId,
    ) -> VcsResult<MergeRequest> {
        self.reviews.merge_merge_request(repository_id, id, merger_id)
    }

    pub fn close_merge_request(
        &self,
        repository_id: &RepositoryId,
        id: &MergeRequestId,
        actor_id: ActorId,
    ) -> VcsResult<MergeRequest> {
        self.reviews.close_merge_request(repository_id, id, actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::content::GitContentStore;
    use crate::events::{EventLog, JsonLinesSink};
    use crate::review::MergePolicy;
    use crate::tree::NodeKind;

    fn with_log() -> (VersionControl, EventLog) {
        let events = EventLog::new();
        let vcs = VersionControl::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryContentStore::new()),
            Arc::new(events.clone()),
        );
        (vcs, events)
    }

    fn add(vcs: &VersionControl, path: &str, body: &str) -> FileChange {
        let hash = vcs.store_content(body.as_bytes()).unwrap();
        FileChange::added(FilePath::new(path).unwrap(), hash)
    }

    fn alice() -> ActorId {
        ActorId::new("alice")
    }

    #[test]
    fn test_create_repository() {
        let (vcs, events) = with_log();
        let repo = vcs.create_repository("demo", None).unwrap();
        assert_eq!(repo.default_branch, BranchName::main());
        assert_eq!(vcs.get_repository(&repo.id).unwrap(), repo);
        assert!(vcs.list_branches(&repo.id).unwrap().is_empty());
        assert_eq!(events.names(), vec!["repository_created"]);

        let trunk = vcs
            .create_repository("other", Some(BranchName::new("trunk").unwrap()))
            .unwrap();
        assert_eq!(trunk.default_branch.as_str(), "trunk");

        let missing = vcs.get_repository(&RepositoryId::new("nope"));
        assert!(matches!(missing, Err(VcsError::RepositoryNotFound(_))));
    }

    #[test]
    fn test_commit_to_branch_bootstraps_and_advances() {
        let (vcs, events) = with_log();
        let repo = vcs.create_repository("demo", None).unwrap();
        let main = BranchName::main();

        let root = vcs
            .commit_to_branch(&repo.id, &main, "initial", alice(), vec![add(&vcs, "a/b.txt", "b")])
            .unwrap();
        assert!(root.is_root());
        assert_eq!(vcs.get_branch(&repo.id, &main).unwrap().head, root.id);

        let second = vcs
            .commit_to_branch(&repo.id, &main, "more", alice(), vec![add(&vcs, "e.txt", "e")])
            .unwrap();
        assert_eq!(second.parent_ids, vec![root.id.clone()]);
        assert_eq!(vcs.get_branch(&repo.id, &main).unwrap().head, second.id);

        // unknown branch once history exists
        let ghost = vcs.commit_to_branch(
            &repo.id,
            &BranchName::new("ghost").unwrap(),
            "x",
            alice(),
            Vec::new(),
        );
        assert!(matches!(ghost, Err(VcsError::BranchNotFound(_))));

        assert_eq!(
            events.names(),
            vec![
                "repository_created",
                "commit_created",
                "branch_created",
                "commit_created",
                "branch_advanced"
            ]
        );
    }

    #[test]
    fn test_paths_and_tree_round_trip() {
        let vcs = VersionControl::in_memory();
        let repo = vcs.create_repository("demo", None).unwrap();
        let change = add(&vcs, "a/b.txt", "hello");
        let h1 = change.content_hash.clone().unwrap();
        let commit = vcs
            .commit_to_branch(&repo.id, &BranchName::main(), "c1", alice(), vec![change])
            .unwrap();

        let paths = vcs.list_paths_as_of(&repo.id, &commit.id).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths.get(&FilePath::new("a/b.txt").unwrap()), Some(&h1));
        assert_eq!(vcs.resolve_content(&h1).unwrap(), b"hello");

        let root = vcs.get_tree(&repo.id, &commit.id, "").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].kind, NodeKind::Directory);
        let sub = vcs.get_tree(&repo.id, &commit.id, "a").unwrap();
        assert_eq!(sub[0].path, "a/b.txt");
        assert_eq!(sub[0].content_hash, Some(h1));
    }

    #[test]
    fn test_read_file() {
        let vcs = VersionControl::in_memory();
        let repo = vcs.create_repository("demo", None).unwrap();
        let main = BranchName::main();
        let first = vcs
            .commit_to_branch(&repo.id, &main, "c1", alice(), vec![add(&vcs, "docs/a.md", "v1")])
            .unwrap();
        let second = vcs
            .commit_to_branch(
                &repo.id,
                &main,
                "c2",
                alice(),
                vec![FileChange::deleted(FilePath::new("docs/a.md").unwrap())],
            )
            .unwrap();

        assert_eq!(vcs.read_file(&repo.id, &first.id, "/docs/a.md").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(vcs.read_file(&repo.id, &second.id, "docs/a.md").unwrap(), None);
        assert_eq!(vcs.read_file(&repo.id, &first.id, "docs/missing.md").unwrap(), None);

        let bad = vcs.read_file(&repo.id, &first.id, "docs/../a.md");
        assert!(matches!(bad, Err(VcsError::InvalidPath { .. })));
    }

    #[test]
    fn test_full_review_flow() {
        let (vcs, events) = with_log();
        let repo = vcs.create_repository("demo", None).unwrap();
        let main = BranchName::main();
        let feature = BranchName::new("feature/login").unwrap();

        let root = vcs
            .commit_to_branch(&repo.id, &main, "initial", alice(), vec![add(&vcs, "README.md", "hi")])
            .unwrap();
        vcs.create_branch(&repo.id, &feature, &root.id).unwrap();
        let feature_head = vcs
            .commit_to_branch(&repo.id, &feature, "login", alice(), vec![add(&vcs, "src/login.rs", "fn login() {}")])
            .unwrap();

        let mr = vcs
            .create_merge_request(&repo.id, "Add login", &feature, &main, alice())
            .unwrap();
        vcs.set_review_verdict(&repo.id, &mr.id, ActorId::new("bob"), Verdict::Approved)
            .unwrap();
        assert!(vcs.readiness(&repo.id, &mr.id).unwrap().is_mergeable());
        events.drain();

        let merged = vcs.merge_merge_request(&repo.id, &mr.id, ActorId::new("bob")).unwrap();
        let merge_commit_id = merged.merge_commit_id.clone().unwrap();
        let merge_commit = vcs.get_commit(&repo.id, &merge_commit_id).unwrap();
        assert_eq!(merge_commit.parent_ids, vec![root.id.clone(), feature_head.id.clone()]);
        assert_eq!(vcs.get_branch(&repo.id, &main).unwrap().head, merge_commit_id);
        assert_eq!(
            events.names(),
            vec!["commit_created", "branch_advanced", "merge_request_merged"]
        );

        // history of main now covers both sides, newest first
        let history = vcs.list_ancestry(&repo.id, &merge_commit_id, 10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, merge_commit_id);

        // the source branch can go once nothing open references it
        vcs.delete_branch(&repo.id, &feature).unwrap();
        assert_eq!(
            vcs.list_merge_requests(&repo.id, Some(MergeRequestStatus::Merged))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_config_is_applied() {
        let config = VcsConfig::new()
            .default_branch(BranchName::new("trunk").unwrap())
            .max_ancestry_limit(2)
            .merge_policy(MergePolicy::new().required_approvals(1))
            .merge_message_template("land {source}");
        let vcs = VersionControl::with_config(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryContentStore::new()),
            Arc::new(NullSink),
        );
        let repo = vcs.create_repository("demo", None).unwrap();
        let trunk = repo.default_branch.clone();

        let mut head = vcs
            .commit_to_branch(&repo.id, &trunk, "c0", alice(), Vec::new())
            .unwrap();
        for i in 1..5 {
            head = vcs
                .commit_to_branch(&repo.id, &trunk, format!("c{}", i), alice(), Vec::new())
                .unwrap();
        }
        assert_eq!(vcs.list_ancestry(&repo.id, &head.id, 100).unwrap().len(), 2);

        let topic = BranchName::new("topic").unwrap();
        vcs.create_branch(&repo.id, &topic, &head.id).unwrap();
        vcs.commit_to_branch(&repo.id, &topic, "work", alice(), Vec::new())
            .unwrap();
        let mr = vcs
            .create_merge_request(&repo.id, "topic", &topic, &trunk, alice())
            .unwrap();

        let blocked = vcs.merge_merge_request(&repo.id, &mr.id, alice());
        assert!(matches!(blocked, Err(VcsError::MergeBlocked { .. })));

        vcs.set_review_verdict(&repo.id, &mr.id, ActorId::new("bob"), Verdict::Approved)
            .unwrap();
        let merged = vcs.merge_merge_request(&repo.id, &mr.id, alice()).unwrap();
        let commit = vcs
            .get_commit(&repo.id, merged.merge_commit_id.as_ref().unwrap())
            .unwrap();
        assert_eq!(commit.message, "land topic");
        assert!(matches!(
            vcs.delete_branch(&repo.id, &trunk),
            Err(VcsError::CannotDeleteDefaultBranch(_))
        ));
    }

    #[test]
    fn test_git_content_store_backend() {
        let dir = TempDir::new().unwrap();
        let content = GitContentStore::init(dir.path().join("objects")).unwrap();
        let vcs = VersionControl::new(Arc::new(MemoryStore::new()), Arc::new(content), Arc::new(NullSink));
        let repo = vcs.create_repository("demo", None).unwrap();

        let hash = vcs.store_content(b"stored in git").unwrap();
        assert_eq!(hash, ContentHash::compute(b"stored in git").unwrap());
        let commit = vcs
            .commit_to_branch(
                &repo.id,
                &BranchName::main(),
                "git backed",
                alice(),
                vec![FileChange::added(FilePath::new("notes.txt").unwrap(), hash.clone())],
            )
            .unwrap();
        let paths = vcs.list_paths_as_of(&repo.id, &commit.id).unwrap();
        assert_eq!(vcs.resolve_content(&paths[&FilePath::new("notes.txt").unwrap()]).unwrap(), b"stored in git");
    }

    #[test]
    fn test_json_lines_events() {
        let sink = Arc::new(JsonLinesSink::new(Vec::new()));
        let vcs = VersionControl::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryContentStore::new()),
            sink.clone(),
        );
        let repo = vcs.create_repository("demo", None).unwrap();
        vcs.commit_to_branch(&repo.id, &BranchName::main(), "initial", alice(), Vec::new())
            .unwrap();
        drop(vcs);

        let sink = Arc::try_unwrap(sink).ok().unwrap();
        let output = String::from_utf8(sink.into_inner()).unwrap();
        let kinds: Vec<String> = output
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["event"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, vec!["repository_created", "commit_created", "branch_created"]);
    }
}
