//! RecordStore - checksummed, cached view over the persistent store.
//!
//! Reads go to the in-memory cache first and fall back to the backend, where
//! every record is verified before it is trusted. Writes reseal the checksum
//! and go through to the backend before the cache is touched, so a failed
//! write never leaves memory ahead of disk.
//!
//! Read-decide-write sequences on one key run under that key's lock via
//! [`RecordStore::with_key`]. Plain reads never take it.

use crate::error::{Result, SyncError};
use crate::storage::PersistentStore;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_engine::{Fields, RecordKey, Timestamp, VersionedRecord};

/// Prefix of keys the engine keeps for itself.
pub const RESERVED_PREFIX: &str = "__tether/";

pub(crate) const INDEX_KEY: &str = "__tether/index";
pub(crate) const CONFLICTS_KEY: &str = "__tether/conflicts";
pub(crate) const LAST_SYNC_KEY: &str = "__tether/last_sync";

/// Whether a key belongs to the reserved namespace.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Cached, integrity-checked record storage.
pub struct RecordStore {
    backend: Arc<dyn PersistentStore>,
    /// Resolved records; shared with caller-facing reads
    cache: DashMap<RecordKey, VersionedRecord>,
    /// Every record key, persisted under [`INDEX_KEY`]
    index: Mutex<BTreeSet<RecordKey>>,
    /// Per-key write locks
    locks: DashMap<RecordKey, Arc<Mutex<()>>>,
}

/// Exclusive access to one key for the duration of [`RecordStore::with_key`].
pub struct KeyGuard<'a> {
    store: &'a RecordStore,
    key: &'a str,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        self.key
    }

    pub fn get(&self) -> Result<Option<VersionedRecord>> {
        self.store.get(self.key)
    }

    /// Store a record, refusing to move the version backwards.
    pub fn put(&self, record: VersionedRecord) -> Result<VersionedRecord> {
        self.store.store_record(self.key, record)
    }
}

impl RecordStore {
    /// Open a store over a backend, loading the key index.
    pub fn open(backend: Arc<dyn PersistentStore>) -> Result<Self> {
        let index = match backend.get(INDEX_KEY)? {
            Some(bytes) => serde_json::from_slice::<BTreeSet<RecordKey>>(&bytes)
                .map_err(|e| SyncError::integrity(INDEX_KEY, e.into()))?,
            None => BTreeSet::new(),
        };

        tracing::debug!(keys = index.len(), "Record store opened");

        Ok(Self {
            backend,
            cache: DashMap::new(),
            index: Mutex::new(index),
            locks: DashMap::new(),
        })
    }

    /// Run `f` while holding the write lock for `key`.
    ///
    /// Not reentrant: `f` must go through the guard rather than calling
    /// `put`, `delete` or `write_local` for the same key.
    pub fn with_key<T>(&self, key: &str, f: impl FnOnce(&KeyGuard<'_>) -> Result<T>) -> Result<T> {
        if is_reserved(key) {
            return Err(SyncError::ReservedKey(key.to_string()));
        }

        let lock = Arc::clone(&self.locks.entry(key.to_string()).or_default());
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f(&KeyGuard { store: self, key })
    }

    /// Read a record, verifying its checksum on cache miss.
    ///
    /// Returns `Ok(None)` if the key is absent.
    pub fn get(&self, key: &str) -> Result<Option<VersionedRecord>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(Some(cached.value().clone()));
        }

        let Some(bytes) = self.backend.get(key)? else {
            return Ok(None);
        };

        let record =
            VersionedRecord::from_bytes(&bytes).map_err(|e| SyncError::integrity(key, e))?;
        record.verify().map_err(|e| SyncError::integrity(key, e))?;

        self.cache.insert(key.to_string(), record.clone());
        Ok(Some(record))
    }

    /// Persist a record under `key`, resealing its checksum first.
    ///
    /// A record older than the stored one is refused with
    /// [`SyncError::StaleWrite`]. Returns the record as stored.
    pub fn put(&self, key: &str, record: VersionedRecord) -> Result<VersionedRecord> {
        self.with_key(key, |slot| slot.put(record))
    }

    /// Remove a record. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.with_key(key, |_| {
            self.backend.remove(key)?;
            self.cache.remove(key);
            self.update_index(|index| index.remove(key))
        })
    }

    /// Create (version 1) or update (version + 1) a record from a local edit.
    pub fn write_local(
        &self,
        key: &str,
        fields: Fields,
        client_id: &str,
        now: Timestamp,
    ) -> Result<VersionedRecord> {
        self.with_key(key, |slot| {
            let record = match slot.get()? {
                Some(mut existing) => {
                    existing.update_fields(fields, client_id, now);
                    existing
                }
                None => VersionedRecord::new(fields, client_id, now),
            };
            slot.put(record)
        })
    }

    /// All record keys, sorted.
    pub fn keys(&self) -> Vec<RecordKey> {
        self.lock_index().iter().cloned().collect()
    }

    /// Keys whose current version was produced by `client_id`.
    ///
    /// Records failing verification are skipped with a warning; they are not
    /// safe to upload.
    pub fn keys_owned_by(&self, client_id: &str) -> Result<Vec<RecordKey>> {
        let mut owned = Vec::new();
        for key in self.keys() {
            match self.get(&key) {
                Ok(Some(record)) if record.meta.client_id == client_id => owned.push(key),
                Ok(_) => {}
                Err(SyncError::Integrity { key, source }) => {
                    tracing::warn!(key = %key, error = %source, "Skipping corrupted record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(owned)
    }

    /// Drop a key from the cache so the next `get` re-reads the backend.
    pub fn evict(&self, key: &str) {
        self.cache.remove(key);
    }

    pub(crate) fn read_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SyncError::integrity(key, e.into())),
            None => Ok(None),
        }
    }

    pub(crate) fn write_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(tether_engine::Error::from)?;
        self.backend.set(key, &bytes)?;
        Ok(())
    }

    /// Caller holds the key lock.
    fn store_record(&self, key: &str, mut record: VersionedRecord) -> Result<VersionedRecord> {
        if let Some(current) = self.stored_version(key)? {
            if record.meta.version < current {
                return Err(SyncError::StaleWrite {
                    key: key.to_string(),
                    stored: current,
                    attempted: record.meta.version,
                });
            }
        }

        record.seal();
        let bytes = record.to_bytes()?;
        self.backend.set(key, &bytes)?;
        self.cache.insert(key.to_string(), record.clone());
        self.update_index(|index| index.insert(key.to_string()))?;

        tracing::debug!(key = %key, version = record.meta.version, "Record stored");
        Ok(record)
    }

    /// Version currently on record. A corrupted copy counts as absent so a
    /// good record can replace it.
    fn stored_version(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            Ok(record) => Ok(record.map(|r| r.meta.version)),
            Err(SyncError::Integrity { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn update_index(&self, change: impl FnOnce(&mut BTreeSet<RecordKey>) -> bool) -> Result<()> {
        let mut index = self.lock_index();
        let mut next = index.clone();
        if change(&mut next) {
            self.write_meta(INDEX_KEY, &next)?;
            *index = next;
        }
        Ok(())
    }

    fn lock_index(&self) -> MutexGuard<'_, BTreeSet<RecordKey>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
