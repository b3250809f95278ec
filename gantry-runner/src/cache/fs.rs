use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use gantry_core::domain::cache::{CacheEntry, ContentRef};

use super::{CacheError, CacheStore, Result, content_ref_for};

/// Filesystem-backed cache with git-style 2-char sharding.
///
/// Layout:
/// - blobs: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
/// - entries: `<root>/keys/<sha256 of key>.json`
///
/// Entry files are created with a no-clobber rename, so when two runs race
/// on the same key exactly one entry survives and both see it.
pub struct FsCacheStore {
    objects_dir: PathBuf,
    keys_dir: PathBuf,
}

impl FsCacheStore {
    /// Create a new `FsCacheStore` rooted at `root`, creating its directories.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let objects_dir = root.as_ref().join("objects");
        let keys_dir = root.as_ref().join("keys");
        fs::create_dir_all(&objects_dir)?;
        fs::create_dir_all(&keys_dir)?;
        Ok(Self {
            objects_dir,
            keys_dir,
        })
    }

    fn blob_path(&self, content_ref: &ContentRef) -> Result<PathBuf> {
        let hex = content_ref.as_str();
        if hex.len() < 3 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CacheError::Corrupt(format!("invalid content ref '{}'", hex)));
        }
        Ok(self.objects_dir.join(&hex[..2]).join(&hex[2..]))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name = hex::encode(Sha256::digest(key.as_bytes()));
        self.keys_dir.join(format!("{}.json", name))
    }

    fn write_blob(&self, content: &[u8]) -> Result<ContentRef> {
        let content_ref = content_ref_for(content);
        let path = self.blob_path(&content_ref)?;

        if path.exists() {
            return Ok(content_ref);
        }

        let Some(shard_dir) = path.parent() else {
            return Err(CacheError::Corrupt(format!("no shard for {}", content_ref)));
        };
        fs::create_dir_all(shard_dir)?;

        // Same-directory temp file, then rename into place.
        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(content)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(content_ref)
    }
}

impl CacheStore for FsCacheStore {
    fn get(&self, key: &str) -> Result<Option<ContentRef>> {
        Ok(self.entry(key)?.map(|entry| entry.content_ref))
    }

    fn put(&self, key: &str, content: &[u8]) -> Result<ContentRef> {
        if let Some(existing) = self.entry(key)? {
            return Ok(existing.content_ref);
        }

        let content_ref = self.write_blob(content)?;
        let entry = CacheEntry {
            key: key.to_string(),
            content_ref: content_ref.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&entry).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&self.keys_dir)?;
        tmp.write_all(&json)?;

        match tmp.persist_noclobber(self.entry_path(key)) {
            Ok(_) => Ok(content_ref),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                // Lost the race: the first writer's binding stands.
                self.get(key)?
                    .ok_or_else(|| CacheError::Corrupt(format!("entry for '{}' vanished", key)))
            }
            Err(e) => Err(CacheError::Io(e.error)),
        }
    }

    fn read(&self, content_ref: &ContentRef) -> Result<Vec<u8>> {
        let path = self.blob_path(content_ref)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CacheError::NotFound(content_ref.clone())
            } else {
                CacheError::Io(e)
            }
        })
    }

    fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let raw = match fs::read(self.entry_path(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e)),
        };
        let entry = serde_json::from_slice(&raw).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        Ok(Some(entry))
    }
}
