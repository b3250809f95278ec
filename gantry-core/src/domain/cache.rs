//! Cache domain types

use serde::{Deserialize, Serialize};

/// Address of a blob in the cache's content store (hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(digest_hex: impl Into<String>) -> Self {
        Self(digest_hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key → content binding
///
/// Shared across runs and never mutated after creation. A changed input
/// produces a new key, and therefore a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub content_ref: ContentRef,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
