//! Content store backed by a git object database.
//!
//! Blobs are written as loose git objects into a bare repository, so git's
//! own content addressing provides the deduplication.

use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::content::ContentStore;
use crate::error::{VcsError, VcsResult};
use crate::storage::{StorageError, StorageResult};
use crate::types::ContentHash;

/// Blob storage in a bare git repository.
///
/// `git2::Repository` is not `Sync`, so access is serialized through a mutex.
pub struct GitContentStore {
    repo: Mutex<Repository>,
    path: PathBuf,
}

impl GitContentStore {
    /// Open an existing bare repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open_bare(path)?;
        Ok(Self {
            repo: Mutex::new(repo),
            path: path.to_path_buf(),
        })
    }

    /// Initialize a new bare repository, creating the directory if needed.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let repo = Repository::init_bare(path)?;
        info!(path = %path.display(), "initialized git content store");
        Ok(Self {
            repo: Mutex::new(repo),
            path: path.to_path_buf(),
        })
    }

    /// Open or initialize a content store.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        match Repository::open_bare(path) {
            Ok(repo) => Ok(Self {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
            Err(e) if e.code() == ErrorCode::NotFound => Self::init(path),
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentStore for GitContentStore {
    fn store(&self, bytes: &[u8]) -> VcsResult<ContentHash> {
        let repo = self.repo.lock();
        let oid = repo.blob(bytes).map_err(StorageError::from)?;
        let hash = ContentHash::from_oid(oid);
        debug!(hash = %hash.short(), size = bytes.len(), "wrote git blob");
        Ok(hash)
    }

    fn resolve(&self, hash: &ContentHash) -> VcsResult<Vec<u8>> {
        let oid = hash.to_oid().map_err(StorageError::from)?;
        let repo = self.repo.lock();
        // the blob borrows the repository, so copy the bytes out before the guard drops
        let bytes = match repo.find_blob(oid) {
            Ok(blob) => blob.content().to_vec(),
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(VcsError::ContentNotFound(hash.clone()))
            }
            Err(e) => return Err(StorageError::Git(e).into()),
        };
        Ok(bytes)
    }

    fn contains(&self, hash: &ContentHash) -> VcsResult<bool> {
        let oid = hash.to_oid().map_err(StorageError::from)?;
        let repo = self.repo.lock();
        let odb = repo.odb().map_err(StorageError::from)?;
        Ok(odb.exists(oid))
    }
}
