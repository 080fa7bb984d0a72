//! Durable backlog of conflicts the resolver could not merge.
//!
//! The backlog lives in the record store's backend under a reserved key and
//! is mirrored in memory. Memory only changes after the backend write
//! succeeds. Every `add` is broadcast to subscribers; nothing in the engine
//! depends on anyone listening.

use crate::error::Result;
use crate::record_store::{RecordStore, CONFLICTS_KEY};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_engine::{
    ConflictRecord, ConflictSide, FieldConflict, RecordKey, Timestamp, VersionedRecord,
};
use tokio::sync::broadcast;

const NOTIFY_CAPACITY: usize = 64;

/// Persistent conflict backlog with change notification.
pub struct ConflictQueue {
    store: Arc<RecordStore>,
    /// At most one entry per key, in detection order
    entries: Mutex<Vec<ConflictRecord>>,
    notifier: broadcast::Sender<ConflictRecord>,
}

impl ConflictQueue {
    /// Open the queue, loading any backlog persisted by a previous process.
    pub fn open(store: Arc<RecordStore>) -> Result<Self> {
        let entries: Vec<ConflictRecord> = store.read_meta(CONFLICTS_KEY)?.unwrap_or_default();
        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "Loaded pending conflicts");
        }

        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        Ok(Self {
            store,
            entries: Mutex::new(entries),
            notifier,
        })
    }

    /// Receive every conflict added from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConflictRecord> {
        self.notifier.subscribe()
    }

    /// Queue both sides of a key, replacing any older entry for the same key.
    ///
    /// Seeing the exact same pair again returns the queued entry untouched,
    /// keeping its detection time so repeated pulls don't restart the grace
    /// period.
    pub fn add(
        &self,
        key: &str,
        local: VersionedRecord,
        remote: VersionedRecord,
        fields: Vec<FieldConflict>,
        now: Timestamp,
    ) -> Result<ConflictRecord> {
        let mut entries = self.lock();
        if let Some(existing) = entries
            .iter()
            .find(|c| c.key == key && c.local.meta == local.meta && c.remote.meta == remote.meta)
        {
            tracing::debug!(key = %key, "Conflict already queued");
            return Ok(existing.clone());
        }

        let conflict = ConflictRecord::new(key, local, remote, fields, now);
        let mut next = entries.clone();
        next.retain(|c| c.key != key);
        next.push(conflict.clone());
        self.persist(&next)?;
        *entries = next;
        drop(entries);

        tracing::info!(
            key = %key,
            severity = ?conflict.severity,
            fields = conflict.fields.len(),
            "Conflict detected"
        );
        // no subscribers is fine
        let _ = self.notifier.send(conflict.clone());

        Ok(conflict)
    }

    /// Last-resort resolution: the later `updatedAt` wins, ties go to the
    /// greater client id.
    ///
    /// This discards the losing side's edits, so callers run it only after
    /// the grace period or when explicitly configured to.
    pub fn resolve_automatic(
        conflict: &ConflictRecord,
        client_id: &str,
        now: Timestamp,
    ) -> (ConflictSide, VersionedRecord) {
        let side = conflict.last_writer();
        let winner = conflict.settle(conflict.side(side).fields.clone(), client_id, now);
        (side, winner)
    }

    /// Remove and return every queued conflict.
    ///
    /// Ownership passes to the caller: nothing is left in the durable
    /// backlog. The sync cycle works from [`ConflictQueue::pending`] and
    /// [`ConflictQueue::remove_entry`] instead, so unsettled entries are
    /// never off disk.
    pub fn drain(&self) -> Result<Vec<ConflictRecord>> {
        let mut entries = self.lock();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        self.persist(&[])?;
        Ok(std::mem::take(&mut *entries))
    }

    /// Remove one exact entry once its outcome has been stored.
    ///
    /// Returns `false` if the entry is gone or was replaced by a newer
    /// detection for the same key. Every other entry stays durable
    /// throughout.
    pub fn remove_entry(&self, conflict: &ConflictRecord) -> Result<bool> {
        let mut entries = self.lock();
        let Some(position) = entries.iter().position(|c| c == conflict) else {
            return Ok(false);
        };

        let mut next = entries.clone();
        next.remove(position);
        self.persist(&next)?;
        *entries = next;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<ConflictRecord> {
        self.lock().iter().find(|c| c.key == key).cloned()
    }

    /// Snapshot of the backlog in detection order.
    pub fn pending(&self) -> Vec<ConflictRecord> {
        self.lock().clone()
    }

    pub fn keys(&self) -> Vec<RecordKey> {
        self.lock().iter().map(|c| c.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn persist(&self, entries: &[ConflictRecord]) -> Result<()> {
        self.store.write_meta(CONFLICTS_KEY, &entries)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ConflictRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::storage::MemoryStore;
    use serde_json::{json, Value};
    use tether_engine::{Fields, Severity};

    fn record(client: &str, updated_at: u64, value: Value) -> VersionedRecord {
        let Value::Object(fields) = value else {
            panic!("expected object");
        };
        let mut record = VersionedRecord::new(fields, client, 100);
        record.meta.updated_at = updated_at;
        record
    }

    fn open() -> (Arc<MemoryStore>, Arc<RecordStore>, ConflictQueue) {
        let backend = Arc::new(MemoryStore::new());
        let store = Arc::new(RecordStore::open(backend.clone()).unwrap());
        let queue = ConflictQueue::open(store.clone()).unwrap();
        (backend, store, queue)
    }

    #[tokio::test]
    async fn add_notifies_subscribers() {
        let (_, _, queue) = open();
        let mut rx = queue.subscribe();

        let added = queue
            .add(
                "doc-1",
                record("a", 1, json!({"status": "draft"})),
                record("b", 1, json!({"status": "published"})),
                vec![],
                500,
            )
            .unwrap();

        let notified = rx.recv().await.unwrap();
        assert_eq!(notified, added);
        assert_eq!(notified.severity, Severity::Low);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn add_without_subscribers_succeeds() {
        let (_, _, queue) = open();
        assert!(queue
            .add("k", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1)
            .is_ok());
    }

    #[test]
    fn severity_reflects_field_count_difference() {
        let (_, _, queue) = open();
        let mut wide = Fields::new();
        for i in 0..4 {
            wide.insert(format!("f{i}"), json!(i));
        }
        let conflict = queue
            .add(
                "k",
                VersionedRecord::new(wide, "a", 1),
                record("b", 1, json!({})),
                vec![],
                1,
            )
            .unwrap();
        assert_eq!(conflict.severity, Severity::Medium);
    }

    #[test]
    fn same_key_replaces_entry() {
        let (_, _, queue) = open();
        queue
            .add("k", record("a", 1, json!({"v": 1})), record("b", 1, json!({})), vec![], 1)
            .unwrap();
        queue
            .add("k", record("a", 2, json!({"v": 2})), record("b", 2, json!({})), vec![], 2)
            .unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get("k").unwrap().detected_at, 2);
    }

    #[test]
    fn same_pair_keeps_detection_time() {
        let (_, _, queue) = open();
        let mut rx = queue.subscribe();
        let (local, remote) = (record("a", 1, json!({"v": 1})), record("b", 1, json!({"v": 2})));

        queue.add("k", local.clone(), remote.clone(), vec![], 1).unwrap();
        let again = queue.add("k", local, remote, vec![], 50).unwrap();

        assert_eq!(again.detected_at, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn backlog_survives_reopen() {
        let (_, store, queue) = open();
        queue
            .add("k", record("a", 1, json!({})), record("b", 1, json!({"x": 1})), vec![], 7)
            .unwrap();
        drop(queue);

        let reopened = ConflictQueue::open(store).unwrap();
        assert_eq!(reopened.keys(), vec!["k".to_string()]);
        assert_eq!(reopened.pending()[0].detected_at, 7);
    }

    #[test]
    fn drain_empties_durably() {
        let (_, store, queue) = open();
        queue
            .add("a", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1)
            .unwrap();
        queue
            .add("b", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 2)
            .unwrap();

        let drained = queue.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        assert!(ConflictQueue::open(store).unwrap().is_empty());
    }

    #[test]
    fn failed_drain_keeps_backlog() {
        let (backend, _, queue) = open();
        queue
            .add("a", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1)
            .unwrap();
        backend.fail_writes_to(CONFLICTS_KEY, true);

        assert!(queue.drain().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_entry_keeps_the_rest_durable() {
        let (_, store, queue) = open();
        let settled = queue
            .add("a", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1)
            .unwrap();
        queue
            .add("b", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 2)
            .unwrap();

        assert!(queue.remove_entry(&settled).unwrap());
        assert!(!queue.remove_entry(&settled).unwrap());
        assert_eq!(queue.keys(), vec!["b".to_string()]);
        assert_eq!(
            ConflictQueue::open(store).unwrap().keys(),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn remove_entry_skips_newer_detection() {
        let (_, _, queue) = open();
        let stale = queue
            .add("k", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1)
            .unwrap();
        queue
            .add("k", record("a", 2, json!({"v": 2})), record("b", 1, json!({})), vec![], 9)
            .unwrap();

        assert!(!queue.remove_entry(&stale).unwrap());
        assert_eq!(queue.get("k").unwrap().detected_at, 9);
    }

    #[test]
    fn failed_removal_keeps_entry_everywhere() {
        let (backend, store, queue) = open();
        let conflict = queue
            .add("k", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1)
            .unwrap();
        backend.fail_writes_to(CONFLICTS_KEY, true);

        assert!(queue.remove_entry(&conflict).is_err());
        assert_eq!(queue.len(), 1);

        backend.fail_writes_to(CONFLICTS_KEY, false);
        assert_eq!(ConflictQueue::open(store).unwrap().len(), 1);
    }

    #[test]
    fn failed_persist_keeps_memory_consistent() {
        let (backend, _, queue) = open();
        backend.fail_writes(true);

        let result = queue.add("k", record("a", 1, json!({})), record("b", 1, json!({})), vec![], 1);
        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert!(queue.is_empty());
    }

    #[test]
    fn automatic_resolution_prefers_later_write() {
        let conflict = ConflictRecord::new(
            "k",
            record("a", 100, json!({"title": "old"})),
            record("b", 200, json!({"title": "new"})),
            vec![],
            0,
        );

        let (side, winner) = ConflictQueue::resolve_automatic(&conflict, "a", 300);
        assert_eq!(side, ConflictSide::Remote);
        assert_eq!(winner.fields["title"], "new");
        assert_eq!(winner.meta.version, 2);
        assert_eq!(winner.meta.client_id, "a");
    }

    #[test]
    fn automatic_resolution_tie_uses_client_id() {
        let conflict = ConflictRecord::new(
            "k",
            record("client-a", 100, json!({"title": "a"})),
            record("client-b", 100, json!({"title": "b"})),
            vec![],
            0,
        );

        let (side, winner) = ConflictQueue::resolve_automatic(&conflict, "client-a", 300);
        assert_eq!(side, ConflictSide::Remote);
        assert_eq!(winner.fields["title"], "b");
    }
}
