//! Content addressing.
//!
//! File bodies are stored once per distinct hash. The commit graph only ever
//! handles [`ContentHash`] values; bytes live behind a [`ContentStore`].
//! Both bundled stores hash with git's blob hashing, so a hash computed by one
//! resolves identically in the other.

mod git;
mod memory;

use crate::error::VcsResult;
use crate::types::ContentHash;

pub use git::GitContentStore;
pub use memory::MemoryContentStore;

/// Deduplicating blob storage keyed by content hash.
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their hash. Storing the same bytes twice is a
    /// no-op that returns the same hash.
    fn store(&self, bytes: &[u8]) -> VcsResult<ContentHash>;

    /// Fetch bytes by hash, failing with `ContentNotFound` if unknown.
    fn resolve(&self, hash: &ContentHash) -> VcsResult<Vec<u8>>;

    fn contains(&self, hash: &ContentHash) -> VcsResult<bool>;
}
