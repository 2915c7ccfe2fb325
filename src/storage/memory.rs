//! In-memory [`Store`] implementation.
//!
//! Each repository gets its own slot with separate locks for commits,
//! branches and merge requests, so activity in one repository never blocks
//! another. Whenever both the merge request and branch maps are locked, the
//! merge request map is locked first.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::graph::Commit;
use crate::refs::Branch;
use crate::repository::Repository;
use crate::review::MergeRequest;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::{
    BranchDeletion, HeadSwap, InsertOutcome, MergeCompletion, MergeRequestInsert, Store,
    VersionedWrite,
};
use crate::types::{BranchName, CommitId, MergeRequestId, RepositoryId};

/// Thread-safe in-memory store.
///
/// Useful for tests, embedding, or as the hot layer in front of a durable
/// backend. Clone it to share across threads.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<RepositoryId, Arc<RepositorySlot>>>>,
}

struct RepositorySlot {
    repository: Repository,
    commits: RwLock<HashMap<CommitId, Arc<Commit>>>,
    branches: RwLock<BTreeMap<BranchName, Branch>>,
    merge_requests: RwLock<BTreeMap<MergeRequestId, MergeRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of repositories held
    pub fn repository_count(&self) -> usize {
        self.inner.read().len()
    }

    fn slot(&self, id: &RepositoryId) -> Option<Arc<RepositorySlot>> {
        self.inner.read().get(id).cloned()
    }

    fn existing_slot(&self, id: &RepositoryId) -> StorageResult<Arc<RepositorySlot>> {
        self.slot(id)
            .ok_or_else(|| StorageError::UnknownRepository(id.to_string()))
    }
}

impl Store for MemoryStore {
    fn insert_repository(&self, repository: Repository) -> StorageResult<InsertOutcome> {
        let mut repositories = self.inner.write();
        if repositories.contains_key(&repository.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let id = repository.id.clone();
        repositories.insert(
            id,
            Arc::new(RepositorySlot {
                repository,
                commits: RwLock::new(HashMap::new()),
                branches: RwLock::new(BTreeMap::new()),
                merge_requests: RwLock::new(BTreeMap::new()),
            }),
        );
        Ok(InsertOutcome::Inserted)
    }

    fn repository(&self, id: &RepositoryId) -> StorageResult<Option<Repository>> {
        Ok(self.slot(id).map(|slot| slot.repository.clone()))
    }

    fn insert_commit(&self, commit: Commit) -> StorageResult<Arc<Commit>> {
        let slot = self.existing_slot(&commit.repository_id)?;
        let mut commits = slot.commits.write();
        if commits.contains_key(&commit.id) {
            return Err(StorageError::DuplicateKey {
                kind: "commit",
                key: commit.id.to_string(),
            });
        }
        let commit = Arc::new(commit);
        commits.insert(commit.id.clone(), Arc::clone(&commit));
        Ok(commit)
    }

    fn commit(&self, repository: &RepositoryId, id: &CommitId) -> StorageResult<Option<Arc<Commit>>> {
        Ok(self
            .slot(repository)
            .and_then(|slot| slot.commits.read().get(id).cloned()))
    }

    fn insert_branch(&self, branch: Branch) -> StorageResult<InsertOutcome> {
        let slot = self.existing_slot(&branch.repository_id)?;
        let mut branches = slot.branches.write();
        if branches.contains_key(&branch.name) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        branches.insert(branch.name.clone(), branch);
        Ok(InsertOutcome::Inserted)
    }

    fn branch(&self, repository: &RepositoryId, name: &BranchName) -> StorageResult<Option<Branch>> {
        Ok(self
            .slot(repository)
            .and_then(|slot| slot.branches.read().get(name).cloned()))
    }

    fn branches(&self, repository: &RepositoryId) -> StorageResult<Vec<Branch>> {
        Ok(self
            .slot(repository)
            .map(|slot| slot.branches.read().values().cloned().collect())
            .unwrap_or_default())
    }

    fn has_branches(&self, repository: &RepositoryId) -> StorageResult<bool> {
        Ok(self
            .slot(repository)
            .map(|slot| !slot.branches.read().is_empty())
            .unwrap_or(false))
    }

    fn compare_and_swap_head(
        &self,
        repository: &RepositoryId,
        name: &BranchName,
        expected: &CommitId,
        new_head: &CommitId,
        at: DateTime<Utc>,
    ) -> StorageResult<HeadSwap> {
        let Some(slot) = self.slot(repository) else {
            return Ok(HeadSwap::Missing);
        };
        let mut branches = slot.branches.write();
        let Some(branch) = branches.get_mut(name) else {
            return Ok(HeadSwap::Missing);
        };
        if &branch.head != expected {
            return Ok(HeadSwap::Stale {
                actual: branch.head.clone(),
            });
        }
        branch.head = new_head.clone();
        branch.updated_at = at;
        Ok(HeadSwap::Swapped(branch.clone()))
    }

    fn delete_branch_if_unreferenced(
        &self,
        repository: &RepositoryId,
        name: &BranchName,
    ) -> StorageResult<BranchDeletion> {
        let Some(slot) = self.slot(repository) else {
            return Ok(BranchDeletion::Missing);
        };
        let merge_requests = slot.merge_requests.read();
        let mut branches = slot.branches.write();

        if !branches.contains_key(name) {
            return Ok(BranchDeletion::Missing);
        }
        let open: Vec<MergeRequestId> = merge_requests
            .values()
            .filter(|mr| mr.is_open() && mr.references(name))
            .map(|mr| mr.id.clone())
            .collect();
        if !open.is_empty() {
            return Ok(BranchDeletion::Referenced(open));
        }

        match branches.remove(name) {
            Some(branch) => Ok(BranchDeletion::Deleted(branch)),
            None => Ok(BranchDeletion::Missing),
        }
    }

    fn insert_merge_request(&self, merge_request: MergeRequest) -> StorageResult<MergeRequestInsert> {
        let slot = self.existing_slot(&merge_request.repository_id)?;
        let mut merge_requests = slot.merge_requests.write();
        let branches = slot.branches.read();

        for name in [&merge_request.source_branch, &merge_request.target_branch] {
            if !branches.contains_key(name) {
                return Ok(MergeRequestInsert::MissingBranch(name.clone()));
            }
        }
        if merge_requests.contains_key(&merge_request.id) {
            return Err(StorageError::DuplicateKey {
                kind: "merge request",
                key: merge_request.id.to_string(),
            });
        }
        merge_requests.insert(merge_request.id.clone(), merge_request);
        Ok(MergeRequestInsert::Inserted)
    }

    fn merge_request(
        &self,
        repository: &RepositoryId,
        id: &MergeRequestId,
    ) -> StorageResult<Option<MergeRequest>> {
        Ok(self
            .slot(repository)
            .and_then(|slot| slot.merge_requests.read().get(id).cloned()))
    }

    fn merge_requests(&self, repository: &RepositoryId) -> StorageResult<Vec<MergeRequest>> {
        let mut all: Vec<MergeRequest> = self
            .slot(repository)
            .map(|slot| slot.merge_requests.read().values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn replace_merge_request(
        &self,
        merge_request: MergeRequest,
        expected_version: u64,
    ) -> StorageResult<VersionedWrite> {
        let Some(slot) = self.slot(&merge_request.repository_id) else {
            return Ok(VersionedWrite::Missing);
        };
        let mut merge_requests = slot.merge_requests.write();
        let Some(current) = merge_requests.get_mut(&merge_request.id) else {
            return Ok(VersionedWrite::Missing);
        };
        if current.version != expected_version {
            return Ok(VersionedWrite::Stale(current.clone()));
        }
        *current = merge_request;
        Ok(VersionedWrite::Written(current.clone()))
    }

    fn complete_merge(
        &self,
        merge_request: MergeRequest,
        expected_version: u64,
        expected_head: &CommitId,
        at: DateTime<Utc>,
    ) -> StorageResult<MergeCompletion> {
        let Some(merge_commit_id) = merge_request.merge_commit_id.clone() else {
            return Err(StorageError::Corrupted {
                what: format!("merge request {}", merge_request.id),
                reason: "completed without a merge commit".to_string(),
            });
        };
        let Some(slot) = self.slot(&merge_request.repository_id) else {
            return Ok(MergeCompletion::MissingMergeRequest);
        };
        let mut merge_requests = slot.merge_requests.write();
        let mut branches = slot.branches.write();

        let Some(current) = merge_requests.get_mut(&merge_request.id) else {
            return Ok(MergeCompletion::MissingMergeRequest);
        };
        if current.version != expected_version {
            return Ok(MergeCompletion::StaleRecord(current.clone()));
        }
        let Some(branch) = branches.get_mut(&merge_request.target_branch) else {
            return Ok(MergeCompletion::MissingBranch);
        };
        if &branch.head != expected_head {
            return Ok(MergeCompletion::StaleHead {
                actual: branch.head.clone(),
            });
        }

        branch.head = merge_commit_id;
        branch.updated_at = at;
        *current = merge_request;
        Ok(MergeCompletion::Completed {
            branch: branch.clone(),
            merge_request: current.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{MergeRequestStatus, Review};
    use crate::types::ActorId;

    fn setup_store() -> (MemoryStore, Repository) {
        let store = MemoryStore::new();
        let repo = Repository::new("demo", BranchName::main());
        store.insert_repository(repo.clone()).unwrap();
        (store, repo)
    }

    fn root_commit(repo: &Repository) -> Commit {
        Commit {
            id: CommitId::generate(),
            repository_id: repo.id.clone(),
            message: "root".to_string(),
            author_id: ActorId::new("alice"),
            timestamp: Utc::now(),
            parent_ids: Vec::new(),
            generation: 1,
            changes: Vec::new(),
        }
    }

    fn branch(repo: &Repository, name: &str, head: &CommitId) -> Branch {
        Branch {
            repository_id: repo.id.clone(),
            name: BranchName::new(name).unwrap(),
            head: head.clone(),
            updated_at: Utc::now(),
        }
    }

    fn open_request(repo: &Repository, source: &str, target: &str, head: &CommitId) -> MergeRequest {
        let now = Utc::now();
        MergeRequest {
            id: MergeRequestId::generate(),
            repository_id: repo.id.clone(),
            title: "change".to_string(),
            source_branch: BranchName::new(source).unwrap(),
            target_branch: BranchName::new(target).unwrap(),
            status: MergeRequestStatus::Open,
            creator_id: ActorId::new("alice"),
            reviews: Vec::<Review>::new(),
            source_head_at_open: head.clone(),
            target_head_at_open: head.clone(),
            merge_commit_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn test_repository_insert_is_unique() {
        let (store, repo) = setup_store();
        assert_eq!(store.insert_repository(repo.clone()).unwrap(), InsertOutcome::AlreadyExists);
        assert_eq!(store.repository_count(), 1);
        assert_eq!(store.repository(&repo.id).unwrap(), Some(repo));
    }

    #[test]
    fn test_commit_requires_repository() {
        let store = MemoryStore::new();
        let orphan = Repository::new("nowhere", BranchName::main());
        let result = store.insert_commit(root_commit(&orphan));
        assert!(matches!(result, Err(StorageError::UnknownRepository(_))));
    }

    #[test]
    fn test_duplicate_commit_rejected() {
        let (store, repo) = setup_store();
        let commit = root_commit(&repo);
        store.insert_commit(commit.clone()).unwrap();
        let result = store.insert_commit(commit);
        assert!(matches!(result, Err(StorageError::DuplicateKey { kind: "commit", .. })));
    }

    #[test]
    fn test_commits_are_namespaced_by_repository() {
        let (store, repo) = setup_store();
        let other = Repository::new("other", BranchName::main());
        store.insert_repository(other.clone()).unwrap();

        let commit = store.insert_commit(root_commit(&repo)).unwrap();
        assert!(store.commit(&repo.id, &commit.id).unwrap().is_some());
        assert!(store.commit(&other.id, &commit.id).unwrap().is_none());
    }

    #[test]
    fn test_compare_and_swap_head() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        let c2 = CommitId::generate();
        store.insert_branch(branch(&repo, "main", &c1.id)).unwrap();
        let main = BranchName::main();

        let swapped = store
            .compare_and_swap_head(&repo.id, &main, &c1.id, &c2, Utc::now())
            .unwrap();
        assert!(matches!(swapped, HeadSwap::Swapped(ref b) if b.head == c2));

        let stale = store
            .compare_and_swap_head(&repo.id, &main, &c1.id, &c2, Utc::now())
            .unwrap();
        assert_eq!(stale, HeadSwap::Stale { actual: c2.clone() });

        let missing = store
            .compare_and_swap_head(&repo.id, &BranchName::new("nope").unwrap(), &c1.id, &c2, Utc::now())
            .unwrap();
        assert_eq!(missing, HeadSwap::Missing);
    }

    #[test]
    fn test_delete_guarded_by_open_merge_requests() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        store.insert_branch(branch(&repo, "main", &c1.id)).unwrap();
        store.insert_branch(branch(&repo, "feature", &c1.id)).unwrap();

        let mr = open_request(&repo, "feature", "main", &c1.id);
        let mr_id = mr.id.clone();
        assert_eq!(store.insert_merge_request(mr.clone()).unwrap(), MergeRequestInsert::Inserted);

        let feature = BranchName::new("feature").unwrap();
        let blocked = store.delete_branch_if_unreferenced(&repo.id, &feature).unwrap();
        assert_eq!(blocked, BranchDeletion::Referenced(vec![mr_id]));

        let mut closed = mr;
        closed.status = MergeRequestStatus::Closed;
        closed.version = 1;
        assert!(matches!(
            store.replace_merge_request(closed, 0).unwrap(),
            VersionedWrite::Written(_)
        ));

        let deleted = store.delete_branch_if_unreferenced(&repo.id, &feature).unwrap();
        assert!(matches!(deleted, BranchDeletion::Deleted(_)));
        assert_eq!(
            store.delete_branch_if_unreferenced(&repo.id, &feature).unwrap(),
            BranchDeletion::Missing
        );
    }

    #[test]
    fn test_merge_request_insert_checks_branches() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        store.insert_branch(branch(&repo, "main", &c1.id)).unwrap();

        let mr = open_request(&repo, "ghost", "main", &c1.id);
        assert_eq!(
            store.insert_merge_request(mr).unwrap(),
            MergeRequestInsert::MissingBranch(BranchName::new("ghost").unwrap())
        );
    }

    #[test]
    fn test_replace_merge_request_version_check() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        store.insert_branch(branch(&repo, "main", &c1.id)).unwrap();
        store.insert_branch(branch(&repo, "feature", &c1.id)).unwrap();
        let mr = open_request(&repo, "feature", "main", &c1.id);
        store.insert_merge_request(mr.clone()).unwrap();

        let mut first = mr.clone();
        first.title = "first".to_string();
        first.version = 1;
        assert!(matches!(store.replace_merge_request(first, 0).unwrap(), VersionedWrite::Written(_)));

        let mut second = mr;
        second.title = "second".to_string();
        second.version = 1;
        match store.replace_merge_request(second, 0).unwrap() {
            VersionedWrite::Stale(current) => assert_eq!(current.title, "first"),
            other => panic!("expected stale write, got {:?}", other),
        }
    }

    fn merged(mr: &MergeRequest, commit: &CommitId) -> MergeRequest {
        let mut merged = mr.clone();
        merged.status = MergeRequestStatus::Merged;
        merged.merge_commit_id = Some(commit.clone());
        merged.version = mr.version + 1;
        merged
    }

    #[test]
    fn test_complete_merge_writes_both_or_nothing() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        let merge_commit = CommitId::generate();
        store.insert_branch(branch(&repo, "main", &c1.id)).unwrap();
        store.insert_branch(branch(&repo, "feature", &c1.id)).unwrap();
        let mr = open_request(&repo, "feature", "main", &c1.id);
        store.insert_merge_request(mr.clone()).unwrap();

        // someone closed the request first: the head must not move
        let mut closed = mr.clone();
        closed.status = MergeRequestStatus::Closed;
        closed.version = 1;
        store.replace_merge_request(closed, 0).unwrap();

        let result = store
            .complete_merge(merged(&mr, &merge_commit), 0, &c1.id, Utc::now())
            .unwrap();
        assert!(matches!(result, MergeCompletion::StaleRecord(ref current) if current.status == MergeRequestStatus::Closed));
        let main = store.branch(&repo.id, &BranchName::main()).unwrap().unwrap();
        assert_eq!(main.head, c1.id);
    }

    #[test]
    fn test_complete_merge_stale_head_keeps_record() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        let moved = CommitId::generate();
        store.insert_branch(branch(&repo, "main", &moved)).unwrap();
        store.insert_branch(branch(&repo, "feature", &c1.id)).unwrap();
        let mr = open_request(&repo, "feature", "main", &c1.id);
        store.insert_merge_request(mr.clone()).unwrap();

        let result = store
            .complete_merge(merged(&mr, &CommitId::generate()), 0, &c1.id, Utc::now())
            .unwrap();
        assert_eq!(result, MergeCompletion::StaleHead { actual: moved });
        let current = store.merge_request(&repo.id, &mr.id).unwrap().unwrap();
        assert_eq!(current.status, MergeRequestStatus::Open);
        assert_eq!(current.version, 0);
    }

    #[test]
    fn test_complete_merge_success_and_corruption() {
        let (store, repo) = setup_store();
        let c1 = store.insert_commit(root_commit(&repo)).unwrap();
        let merge_commit = CommitId::generate();
        store.insert_branch(branch(&repo, "main", &c1.id)).unwrap();
        store.insert_branch(branch(&repo, "feature", &c1.id)).unwrap();
        let mr = open_request(&repo, "feature", "main", &c1.id);
        store.insert_merge_request(mr.clone()).unwrap();

        let mut without_commit = merged(&mr, &merge_commit);
        without_commit.merge_commit_id = None;
        let err = store
            .complete_merge(without_commit, 0, &c1.id, Utc::now())
            .unwrap_err();
        assert!(err.is_integrity_violation());

        match store
            .complete_merge(merged(&mr, &merge_commit), 0, &c1.id, Utc::now())
            .unwrap()
        {
            MergeCompletion::Completed { branch, merge_request } => {
                assert_eq!(branch.head, merge_commit);
                assert_eq!(merge_request.status, MergeRequestStatus::Merged);
                assert_eq!(merge_request.version, 1);
            }
            other => panic!("expected completed merge, got {:?}", other),
        }
    }
}
