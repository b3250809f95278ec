//! Content-addressed step cache
//!
//! A cache entry binds a key to the SHA-256 address of a blob. Entries are
//! written once: a second `put` for the same key is a no-op that returns the
//! first writer's [`ContentRef`]. Eviction is not handled here.

pub mod fs;
pub mod memory;
pub mod snapshot;

use sha2::{Digest, Sha256};
use thiserror::Error;

use gantry_core::domain::cache::{CacheEntry, ContentRef};

pub use fs::FsCacheStore;
pub use memory::InMemoryCacheStore;
pub use snapshot::{CachedArtifact, effective_key};
pub(crate) use snapshot::safe_relative;

/// Errors from cache operations
///
/// None of these fail a step: the executor logs them and carries on without
/// the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("blob not found: {0}")]
    NotFound(ContentRef),

    #[error("corrupt cache data: {0}")]
    Corrupt(String),

    #[error("unsafe cached path: {0}")]
    UnsafePath(String),

    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Key → content store
pub trait CacheStore: Send + Sync {
    /// Looks up the content bound to `key`; never modifies the store
    fn get(&self, key: &str) -> Result<Option<ContentRef>>;

    /// Binds `key` to `content` unless the key is already bound
    ///
    /// Returns the ref the key is bound to after the call, which is the
    /// existing one when another writer got there first.
    fn put(&self, key: &str, content: &[u8]) -> Result<ContentRef>;

    /// Reads a blob by address
    fn read(&self, content_ref: &ContentRef) -> Result<Vec<u8>>;

    /// Full entry for `key`, including when it was created
    fn entry(&self, key: &str) -> Result<Option<CacheEntry>>;
}

/// Content address of `data`
pub fn content_ref_for(data: &[u8]) -> ContentRef {
    ContentRef::new(hex::encode(Sha256::digest(data)))
}
