//! Snapshots of a step's cached paths
//!
//! On success, the paths a step declares are captured into a
//! [`CachedArtifact`] and stored as one blob. On a later hit the artifact is
//! written back into the step's working directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use gantry_core::domain::pipeline::CacheSpec;

use super::{CacheError, Result};

/// One file inside an artifact, stored relative to the step directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: String,
    #[serde(with = "hex::serde")]
    pub contents: Vec<u8>,
}

/// Everything a cached step produced under its declared paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub files: Vec<CachedFile>,
}

impl CachedArtifact {
    /// Captures the declared paths under `base`
    ///
    /// Directories are walked recursively. Paths that do not exist are
    /// skipped; anything other than regular files and directories is ignored.
    pub fn capture(base: &Path, paths: &[String]) -> Result<Self> {
        let mut files = Vec::new();
        for declared in paths {
            let relative = safe_relative(declared)?;
            collect(base, &relative, &mut files)?;
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { files })
    }

    /// Writes every file back under `base`, creating directories as needed
    pub fn restore(&self, base: &Path) -> Result<usize> {
        for file in &self.files {
            let target = base.join(safe_relative(&file.path)?);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.contents)?;
        }
        Ok(self.files.len())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Corrupt(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}

fn collect(base: &Path, relative: &Path, files: &mut Vec<CachedFile>) -> Result<()> {
    let full = base.join(relative);
    let metadata = match fs::symlink_metadata(&full) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if metadata.is_file() {
        files.push(CachedFile {
            path: relative.to_string_lossy().replace('\\', "/"),
            contents: fs::read(&full)?,
        });
    } else if metadata.is_dir() {
        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            collect(base, &relative.join(entry.file_name()), files)?;
        }
    }

    Ok(())
}

/// Rejects absolute paths and `..` so artifacts stay inside the step directory
pub(crate) fn safe_relative(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    let safe = !raw.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(path.to_path_buf())
    } else {
        Err(CacheError::UnsafePath(raw.to_string()))
    }
}

/// Effective cache key for a step running in `base`
///
/// `key` alone when no files are listed; otherwise `key-<sha256>` over each
/// listed file's name and contents. A missing file hashes as absent, so
/// creating it later changes the key.
pub fn effective_key(spec: &CacheSpec, base: &Path) -> Result<String> {
    if spec.files.is_empty() {
        return Ok(spec.key.clone());
    }

    let mut hasher = Sha256::new();
    for file in &spec.files {
        hasher.update(file.as_bytes());
        hasher.update([0u8]);
        match fs::read(base.join(safe_relative(file)?)) {
            Ok(contents) => {
                hasher.update([1u8]);
                hasher.update(&contents);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => hasher.update([0u8]),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(format!("{}-{}", spec.key, hex::encode(hasher.finalize())))
}
