//! Captured output storage
//!
//! Every step's stdout and stderr, and every stage's combined log, are stored
//! under a [`LogRef`]. Stores are write-once per ref in practice: a run never
//! writes the same ref twice.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;

use gantry_core::domain::log::LogRef;

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("log not found: {0}")]
    NotFound(LogRef),

    #[error("log store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage for captured output
pub trait LogStore: Send + Sync {
    fn write(&self, log_ref: &LogRef, contents: &[u8]) -> Result<(), LogStoreError>;

    fn read(&self, log_ref: &LogRef) -> Result<Vec<u8>, LogStoreError>;
}

/// Stores each ref as a file under a root directory
pub struct FsLogStore {
    root: PathBuf,
}

impl FsLogStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, LogStoreError> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, log_ref: &LogRef) -> PathBuf {
        self.root.join(log_ref.as_str())
    }
}

impl LogStore for FsLogStore {
    fn write(&self, log_ref: &LogRef, contents: &[u8]) -> Result<(), LogStoreError> {
        let path = self.path_for(log_ref);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn read(&self, log_ref: &LogRef) -> Result<Vec<u8>, LogStoreError> {
        fs::read(self.path_for(log_ref)).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                LogStoreError::NotFound(log_ref.clone())
            } else {
                LogStoreError::Io(e)
            }
        })
    }
}

/// In-memory log store
#[derive(Default)]
pub struct InMemoryLogStore {
    logs: RwLock<HashMap<LogRef, Vec<u8>>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for InMemoryLogStore {
    fn write(&self, log_ref: &LogRef, contents: &[u8]) -> Result<(), LogStoreError> {
        self.logs.write().insert(log_ref.clone(), contents.to_vec());
        Ok(())
    }

    fn read(&self, log_ref: &LogRef) -> Result<Vec<u8>, LogStoreError> {
        self.logs
            .read()
            .get(log_ref)
            .cloned()
            .ok_or_else(|| LogStoreError::NotFound(log_ref.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::log::OutputStream;
    use uuid::Uuid;

    #[test]
    fn test_fs_store_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLogStore::new(dir.path()).unwrap();
        let log_ref = LogRef::for_step(Uuid::new_v4(), "backend tests", 1, OutputStream::Stdout);

        store.write(&log_ref, b"ok\n").unwrap();
        assert_eq!(store.read(&log_ref).unwrap(), b"ok\n");
        assert!(dir.path().join(log_ref.as_str()).exists());
    }

    #[test]
    fn test_missing_log_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLogStore::new(dir.path()).unwrap();
        let log_ref = LogRef::for_stage(Uuid::new_v4(), "deploy");

        assert!(matches!(
            store.read(&log_ref),
            Err(LogStoreError::NotFound(_))
        ));
        assert!(matches!(
            InMemoryLogStore::new().read(&log_ref),
            Err(LogStoreError::NotFound(_))
        ));
    }
}
