//! Persistent key-value store contract and an in-memory implementation.

use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Failure of the underlying store.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("read failed for '{key}': {message}")]
    Read { key: String, message: String },

    #[error("write failed for '{key}': {message}")]
    Write { key: String, message: String },

    #[error("remove failed for '{key}': {message}")]
    Remove { key: String, message: String },
}

/// Byte-oriented key-value store supplied by the host.
///
/// Calls block until the underlying I/O completes. Implementations must be
/// safe to share between the sync cycle and caller-facing reads.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory [`PersistentStore`].
///
/// Exposes hooks to tamper with stored bytes and to fail writes, so tests can
/// exercise integrity and storage-failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
    fail_writes: AtomicBool,
    failing_keys: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes stored under a key.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Overwrite stored bytes directly, bypassing any checksum logic.
    pub fn insert_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    /// Make every subsequent `set`/`remove` fail until switched off.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes to one key only.
    pub fn fail_writes_to(&self, key: &str, fail: bool) {
        if fail {
            self.failing_keys.insert(key.to_string());
        } else {
            self.failing_keys.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn writes_failing(&self, key: &str) -> bool {
        self.fail_writes.load(Ordering::SeqCst) || self.failing_keys.contains(key)
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.writes_failing(key) {
            return Err(StorageError::Write {
                key: key.to_string(),
                message: "write disabled".to_string(),
            });
        }
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.writes_failing(key) {
            return Err(StorageError::Remove {
                key: key.to_string(),
                message: "write disabled".to_string(),
            });
        }
        self.entries.remove(key);
        Ok(())
    }
}
