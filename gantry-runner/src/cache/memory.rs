use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use gantry_core::domain::cache::{CacheEntry, ContentRef};

use super::{CacheError, CacheStore, Result, content_ref_for};

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    blobs: HashMap<ContentRef, Vec<u8>>,
}

/// In-memory cache, used by tests and one-off local runs
#[derive(Default)]
pub struct InMemoryCacheStore {
    inner: Mutex<Inner>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<ContentRef>> {
        Ok(self
            .inner
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.content_ref.clone()))
    }

    fn put(&self, key: &str, content: &[u8]) -> Result<ContentRef> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get(key) {
            return Ok(existing.content_ref.clone());
        }

        let content_ref = content_ref_for(content);
        inner
            .blobs
            .entry(content_ref.clone())
            .or_insert_with(|| content.to_vec());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                content_ref: content_ref.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(content_ref)
    }

    fn read(&self, content_ref: &ContentRef) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .blobs
            .get(content_ref)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(content_ref.clone()))
    }

    fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_twice_keeps_first_content() {
        let store = InMemoryCacheStore::new();
        let first = store.put("k", b"X").unwrap();
        let second = store.put("k", b"Y").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.read(&first).unwrap(), b"X");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_is_side_effect_free() {
        let store = InMemoryCacheStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
        assert!(store.is_empty());
    }
}
