//! In-memory content store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::content::ContentStore;
use crate::error::{VcsError, VcsResult};
use crate::storage::StorageError;
use crate::types::ContentHash;

/// Deduplicating blob map. Clone to share.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    blobs: Arc<RwLock<HashMap<ContentHash, Arc<[u8]>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of distinct blobs held
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn store(&self, bytes: &[u8]) -> VcsResult<ContentHash> {
        let hash = ContentHash::compute(bytes).map_err(StorageError::from)?;

        // cheap check first so repeated writes stay on the read lock
        if self.blobs.read().contains_key(&hash) {
            debug!(hash = %hash.short(), "content already stored");
            return Ok(hash);
        }

        self.blobs
            .write()
            .entry(hash.clone())
            .or_insert_with(|| Arc::from(bytes));
        debug!(hash = %hash.short(), size = bytes.len(), "stored content");
        Ok(hash)
    }

    fn resolve(&self, hash: &ContentHash) -> VcsResult<Vec<u8>> {
        self.blobs
            .read()
            .get(hash)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| VcsError::ContentNotFound(hash.clone()))
    }

    fn contains(&self, hash: &ContentHash) -> VcsResult<bool> {
        Ok(self.blobs.read().contains_key(hash))
    }
}
