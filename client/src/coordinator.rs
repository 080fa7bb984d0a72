//! SyncCoordinator - drives push/pull cycles and routes incoming records.
//!
//! # Cycle
//!
//! ```text
//! Idle -> PushingLocal -> PullingRemote -> ProcessingConflicts -> Idle
//!   \__________________________________________________________/
//!                  any state -> Offline -> Idle
//! ```
//!
//! 1. Push records owned by this client changed since the last sync
//! 2. Pull remote changes since the last sync, routing each through
//!    [`SyncCoordinator::apply_incoming`]
//! 3. Settle conflicts older than the grace period with last-writer-wins
//! 4. Persist the cycle start as the new last-sync marker
//!
//! At most one cycle runs at a time. A request while one is running is a
//! no-op; the next tick picks up whatever was missed. Transport failures and
//! connectivity loss abandon the rest of the cycle without rolling back what
//! already happened.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::queue::ConflictQueue;
use crate::record_store::{is_reserved, RecordStore, LAST_SYNC_KEY};
use crate::transport::{SyncEntry, Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_engine::{
    now_millis, ApplyAction, ApplyReason, ClientIdentity, ConflictRecord, ConflictResolver,
    Fields, RecordKey, Resolution, Timestamp, Version, VersionedRecord,
};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Where the coordinator is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    PushingLocal,
    PullingRemote,
    ProcessingConflicts,
    Offline,
}

/// Result of routing one incoming record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub key: RecordKey,
    pub action: ApplyAction,
    pub reason: ApplyReason,
    /// Version stored locally once the record has been applied
    pub version: Version,
}

/// How a queued conflict should be settled by hand.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionChoice {
    KeepLocal,
    KeepRemote,
    Custom(Fields),
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Last-sync marker the cycle started from
    pub since: Timestamp,
    pub pushed: usize,
    pub pulled: usize,
    pub outcomes: Vec<ApplyOutcome>,
    /// Incoming keys skipped after integrity or storage failures
    pub skipped: Vec<RecordKey>,
    pub conflicts_queued: usize,
    pub auto_resolved: usize,
    /// Conflicts dropped because a newer version arrived meanwhile
    pub superseded: usize,
    /// Conflicts still inside the grace period
    pub deferred: usize,
}

/// Why a sync request did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InProgress,
    Offline,
}

/// Why a cycle stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Transport(TransportError),
    ConnectivityLost,
    Storage(String),
}

/// What a call to [`SyncCoordinator::sync_now`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
    Aborted {
        stage: SyncState,
        reason: AbortReason,
    },
}

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Orchestrates sync for one client.
pub struct SyncCoordinator {
    identity: ClientIdentity,
    resolver: ConflictResolver,
    store: Arc<RecordStore>,
    queue: ConflictQueue,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    sync_in_progress: AtomicBool,
    online: watch::Sender<bool>,
    /// Bumped on every transition to offline
    connectivity_losses: watch::Sender<u64>,
    state: watch::Sender<SyncState>,
    restored: Notify,
    clock: Clock,
}

/// What automatic processing did with one queued conflict.
enum Settlement {
    Resolved,
    Superseded,
    /// Resolved or replaced by someone else first
    Gone,
}

/// Clears `sync_in_progress` even if the cycle future is dropped mid-flight.
struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncCoordinator {
    /// Create a coordinator. Opens the conflict backlog from the store.
    pub fn new(
        identity: ClientIdentity,
        store: Arc<RecordStore>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Result<Self> {
        let queue = ConflictQueue::open(store.clone())?;
        let (online, _) = watch::channel(true);
        let (connectivity_losses, _) = watch::channel(0);
        let (state, _) = watch::channel(SyncState::Idle);

        tracing::info!(client_id = %identity, "Sync coordinator created");

        Ok(Self {
            resolver: ConflictResolver::new(identity.id().clone()),
            identity,
            store,
            queue,
            transport,
            config,
            sync_in_progress: AtomicBool::new(false),
            online,
            connectivity_losses,
            state,
            restored: Notify::new(),
            clock: Arc::new(now_millis),
        })
    }

    /// Replace the wall clock (milliseconds since epoch).
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn client_id(&self) -> &str {
        self.identity.id()
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn conflicts(&self) -> &ConflictQueue {
        &self.queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Conflict-detected notifications.
    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<ConflictRecord> {
        self.queue.subscribe()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// A fresh version-1 record attributed to this client. Not persisted.
    pub fn create_versioned_record(&self, fields: Fields) -> VersionedRecord {
        VersionedRecord::new(fields, self.client_id(), self.now())
    }

    /// Record a local edit, creating or bumping the record under `key`.
    pub fn write_local(&self, key: &str, fields: Fields) -> Result<VersionedRecord> {
        self.store.write_local(key, fields, self.client_id(), self.now())
    }

    /// Last successfully completed sync, if any.
    pub fn last_sync(&self) -> Result<Option<Timestamp>> {
        self.store.read_meta(LAST_SYNC_KEY)
    }

    /// Route a record received from a peer.
    ///
    /// Merge conflicts are queued and reported as [`ApplyAction::Conflict`];
    /// only integrity and storage failures come back as errors.
    pub fn apply_incoming(&self, key: &str, record: VersionedRecord) -> Result<ApplyOutcome> {
        if is_reserved(key) {
            return Err(SyncError::ReservedKey(key.to_string()));
        }
        record
            .verify()
            .map_err(|e| SyncError::integrity(key, e))?;

        let now = self.now();
        let (action, reason, version) = self.store.with_key(key, |slot| {
            let Some(local) = slot.get()? else {
                let stored = slot.put(record)?;
                return Ok((ApplyAction::Created, ApplyReason::NewRecord, stored.meta.version));
            };

            let resolution = self.resolver.resolve(&local, &record, now);
            let (action, reason) = (resolution.action(), resolution.reason());
            let version = match resolution {
                Resolution::AcceptRemote => slot.put(record)?.meta.version,
                Resolution::Merged(merged) => slot.put(merged)?.meta.version,
                Resolution::KeepLocal | Resolution::Identical => local.meta.version,
                Resolution::Conflict(fields) => {
                    let version = local.meta.version;
                    self.queue.add(key, local, record, fields, now)?;
                    version
                }
            };
            Ok((action, reason, version))
        })?;

        tracing::debug!(key = %key, ?action, ?reason, version, "Applied incoming record");
        Ok(ApplyOutcome {
            key: key.to_string(),
            action,
            reason,
            version,
        })
    }

    /// Settle a queued conflict by hand and write the result.
    ///
    /// The written version is above both sides and above anything stored
    /// since the conflict was detected.
    pub fn resolve_conflict(&self, key: &str, choice: ResolutionChoice) -> Result<VersionedRecord> {
        let now = self.now();
        let stored = self.store.with_key(key, |slot| {
            let conflict = self
                .queue
                .get(key)
                .ok_or_else(|| SyncError::ConflictNotFound(key.to_string()))?;

            let fields = match choice {
                ResolutionChoice::KeepLocal => conflict.local.fields.clone(),
                ResolutionChoice::KeepRemote => conflict.remote.fields.clone(),
                ResolutionChoice::Custom(fields) => fields,
            };

            let mut record = conflict.settle(fields, self.client_id(), now);
            if let Some(current) = slot.get()? {
                if current.meta.version >= record.meta.version {
                    record.meta.version = current.meta.version + 1;
                }
            }

            let stored = slot.put(record)?;
            self.queue.remove_entry(&conflict)?;
            Ok(stored)
        })?;

        tracing::info!(key = %key, version = stored.meta.version, "Conflict resolved manually");
        Ok(stored)
    }

    /// Connectivity callback from the host.
    ///
    /// Going offline abandons any in-flight network call. Coming back online
    /// returns to `Idle` and triggers a fresh cycle; the abandoned one is not
    /// resumed.
    pub fn on_connectivity_change(&self, online: bool) {
        let was_online = self.online.send_replace(online);
        if was_online == online {
            return;
        }

        if online {
            tracing::info!("Connectivity restored");
            self.state.send_replace(SyncState::Idle);
            self.restored.notify_one();
        } else {
            tracing::warn!("Connectivity lost");
            self.connectivity_losses.send_modify(|losses| *losses += 1);
            self.state.send_replace(SyncState::Offline);
        }
    }

    /// Run the periodic sync loop on the current tokio runtime.
    ///
    /// Cycles run on every tick of `sync_interval` (the first immediately) and
    /// whenever connectivity is restored. Abort the handle to stop.
    pub fn start_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = this.restored.notified() => {}
                }
                this.sync_now().await;
            }
        })
    }

    /// Run one cycle now, unless offline or another cycle is running.
    pub async fn sync_now(&self) -> CycleOutcome {
        if !self.is_online() {
            tracing::debug!("Sync skipped: offline");
            return CycleOutcome::Skipped(SkipReason::Offline);
        }
        if self
            .sync_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync skipped: cycle already running");
            return CycleOutcome::Skipped(SkipReason::InProgress);
        }

        let _guard = InProgressGuard(&self.sync_in_progress);
        let outcome = self.run_cycle().await;
        self.state.send_replace(if self.is_online() {
            SyncState::Idle
        } else {
            SyncState::Offline
        });
        outcome
    }

    async fn run_cycle(&self) -> CycleOutcome {
        let started_at = self.now();
        let epoch = *self.connectivity_losses.borrow();
        let since = match self.last_sync() {
            Ok(marker) => marker.unwrap_or(0),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable last-sync marker, pulling everything");
                0
            }
        };

        tracing::info!(client_id = %self.identity, since, "Sync cycle started");
        let mut report = SyncReport {
            since,
            ..SyncReport::default()
        };

        // Push
        if let Err(reason) = self.enter(SyncState::PushingLocal, epoch) {
            return abort(SyncState::PushingLocal, reason);
        }
        let outgoing = match self.collect_outgoing(since) {
            Ok(entries) => entries,
            Err(e) => return abort(SyncState::PushingLocal, AbortReason::Storage(e.to_string())),
        };
        for batch in outgoing.chunks(self.config.push_batch_size.max(1)) {
            let request = self.transport.push(self.client_id(), batch.to_vec());
            if let Err(reason) = self.call(epoch, request).await {
                return abort(SyncState::PushingLocal, reason);
            }
            report.pushed += batch.len();
        }

        // Pull
        if let Err(reason) = self.enter(SyncState::PullingRemote, epoch) {
            return abort(SyncState::PullingRemote, reason);
        }
        let incoming = match self.call(epoch, self.transport.pull(self.client_id(), since)).await {
            Ok(entries) => entries,
            Err(reason) => return abort(SyncState::PullingRemote, reason),
        };
        report.pulled = incoming.len();
        for entry in incoming {
            match self.apply_incoming(&entry.key, entry.record) {
                Ok(outcome) => {
                    if outcome.action == ApplyAction::Conflict {
                        report.conflicts_queued += 1;
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "Skipping incoming record");
                    report.skipped.push(entry.key);
                }
            }
        }

        // Conflicts
        if let Err(reason) = self.enter(SyncState::ProcessingConflicts, epoch) {
            return abort(SyncState::ProcessingConflicts, reason);
        }
        self.process_conflicts(&mut report);

        if let Err(e) = self.store.write_meta(LAST_SYNC_KEY, &started_at) {
            return abort(
                SyncState::ProcessingConflicts,
                AbortReason::Storage(e.to_string()),
            );
        }

        tracing::info!(
            pushed = report.pushed,
            pulled = report.pulled,
            conflicts = report.conflicts_queued,
            auto_resolved = report.auto_resolved,
            skipped = report.skipped.len(),
            "Sync cycle completed"
        );
        CycleOutcome::Completed(report)
    }

    /// Abort if connectivity dropped at any point since the cycle started,
    /// even if it has already come back.
    fn enter(&self, next: SyncState, epoch: u64) -> std::result::Result<(), AbortReason> {
        if !self.is_online() || *self.connectivity_losses.borrow() != epoch {
            return Err(AbortReason::ConnectivityLost);
        }
        self.state.send_replace(next);
        Ok(())
    }

    /// Records owned by this client touched since `since`.
    fn collect_outgoing(&self, since: Timestamp) -> Result<Vec<SyncEntry>> {
        let mut entries = Vec::new();
        for key in self.store.keys_owned_by(self.client_id())? {
            match self.store.get(&key) {
                Ok(Some(record)) if record.meta.updated_at >= since => {
                    entries.push(SyncEntry::new(key, record));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(key = %key, error = %e, "Not pushing record"),
            }
        }
        Ok(entries)
    }

    /// Await a transport call under the request timeout, giving up as soon
    /// as connectivity drops.
    async fn call<T>(
        &self,
        epoch: u64,
        request: impl Future<Output = std::result::Result<T, TransportError>>,
    ) -> std::result::Result<T, AbortReason> {
        let timeout = self.config.request_timeout;
        tokio::select! {
            result = tokio::time::timeout(timeout, request) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(AbortReason::Transport(e)),
                Err(_) => Err(AbortReason::Transport(TransportError::Timeout(timeout))),
            },
            _ = connectivity_lost(self.connectivity_losses.subscribe(), epoch) => {
                Err(AbortReason::ConnectivityLost)
            }
        }
    }

    /// Settle conflicts past the grace period. Entries leave the backlog
    /// one at a time, only after their outcome is stored.
    fn process_conflicts(&self, report: &mut SyncReport) {
        if !self.config.auto_resolve_conflicts {
            report.deferred = self.queue.len();
            return;
        }

        let now = self.now();
        let grace = u64::try_from(self.config.conflict_grace_period.as_millis()).unwrap_or(u64::MAX);

        for conflict in self.queue.pending() {
            if conflict.age(now) < grace {
                report.deferred += 1;
                continue;
            }
            match self.settle_automatically(&conflict, now) {
                Ok(Settlement::Resolved) => report.auto_resolved += 1,
                Ok(Settlement::Superseded) => report.superseded += 1,
                Ok(Settlement::Gone) => {}
                Err(e) => {
                    tracing::warn!(key = %conflict.key, error = %e, "Automatic resolution failed");
                    report.deferred += 1;
                }
            }
        }
    }

    fn settle_automatically(&self, conflict: &ConflictRecord, now: Timestamp) -> Result<Settlement> {
        let key = conflict.key.as_str();
        self.store.with_key(key, |slot| {
            if self.queue.get(key).as_ref() != Some(conflict) {
                return Ok(Settlement::Gone);
            }

            let ceiling = conflict.local.meta.version.max(conflict.remote.meta.version);
            if slot.get()?.is_some_and(|c| c.meta.version > ceiling) {
                self.queue.remove_entry(conflict)?;
                tracing::debug!(key = %key, "Conflict superseded by newer version");
                return Ok(Settlement::Superseded);
            }

            let (side, winner) = ConflictQueue::resolve_automatic(conflict, self.client_id(), now);
            let stored = slot.put(winner)?;
            self.queue.remove_entry(conflict)?;
            tracing::info!(
                key = %key,
                winner = ?side,
                version = stored.meta.version,
                "Conflict resolved by last-writer-wins"
            );
            Ok(Settlement::Resolved)
        })
    }
}

fn abort(stage: SyncState, reason: AbortReason) -> CycleOutcome {
    tracing::warn!(?stage, ?reason, "Sync cycle aborted, retrying next tick");
    CycleOutcome::Aborted { stage, reason }
}

/// Resolves once connectivity has been lost since `epoch`, even if it was
/// restored before this future got to run.
async fn connectivity_lost(mut losses: watch::Receiver<u64>, epoch: u64) {
    loop {
        if *losses.borrow_and_update() != epoch {
            return;
        }
        if losses.changed().await.is_err() {
            // sender gone: connectivity can no longer change
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn push(
            &self,
            _client_id: &str,
            _records: Vec<SyncEntry>,
        ) -> std::result::Result<(), TransportError> {
            Ok(())
        }

        async fn pull(
            &self,
            _client_id: &str,
            _since: Timestamp,
        ) -> std::result::Result<Vec<SyncEntry>, TransportError> {
            Ok(vec![])
        }
    }

    fn coordinator(client: &str) -> SyncCoordinator {
        let store = Arc::new(RecordStore::open(Arc::new(MemoryStore::new())).unwrap());
        SyncCoordinator::new(
            ClientIdentity::from_id(client),
            store,
            Arc::new(NullTransport),
            SyncConfig::default(),
        )
        .unwrap()
        .with_clock(|| 5_000)
    }

    fn remote(client: &str, version: u64, value: Value) -> VersionedRecord {
        let mut record = VersionedRecord::new(fields(value), client, 1_000);
        record.meta.version = version;
        record.seal();
        record
    }

    #[test]
    fn create_versioned_record_starts_at_one() {
        let sync = coordinator("client-a");
        let record = sync.create_versioned_record(fields(json!({"title": "Draft"})));
        assert_eq!(record.meta.version, 1);
        assert_eq!(record.meta.client_id, "client-a");
        assert_eq!(record.meta.created_at, 5_000);
    }

    #[test]
    fn incoming_for_unknown_key_is_created() {
        let sync = coordinator("client-a");
        let outcome = sync
            .apply_incoming("doc-1", remote("client-b", 1, json!({"title": "x"})))
            .unwrap();
        assert_eq!(outcome.action, ApplyAction::Created);
        assert_eq!(outcome.reason, ApplyReason::NewRecord);
    }

    #[test]
    fn newer_incoming_replaces_local() {
        let sync = coordinator("client-a");
        sync.write_local("doc-1", fields(json!({"title": "Draft"})))
            .unwrap();

        let incoming = remote("client-b", 2, json!({"title": "Final"}));
        let outcome = sync.apply_incoming("doc-1", incoming.clone()).unwrap();

        assert_eq!(outcome.action, ApplyAction::Updated);
        assert_eq!(outcome.reason, ApplyReason::NewerVersion);
        assert_eq!(sync.store().get("doc-1").unwrap(), Some(incoming));
    }

    #[test]
    fn older_incoming_is_ignored() {
        let sync = coordinator("client-a");
        sync.write_local("doc-1", fields(json!({"n": 1}))).unwrap();
        sync.write_local("doc-1", fields(json!({"n": 2}))).unwrap();

        let outcome = sync
            .apply_incoming("doc-1", remote("client-b", 1, json!({"n": 0})))
            .unwrap();
        assert_eq!(outcome.action, ApplyAction::Ignored);
        assert_eq!(outcome.reason, ApplyReason::OlderVersion);
        assert_eq!(outcome.version, 2);
    }

    #[test]
    fn tampered_incoming_is_rejected() {
        let sync = coordinator("client-a");
        let mut incoming = remote("client-b", 1, json!({"n": 1}));
        incoming.fields.insert("n".into(), json!(2));

        assert!(matches!(
            sync.apply_incoming("doc-1", incoming),
            Err(SyncError::Integrity { .. })
        ));
        assert!(sync.store().get("doc-1").unwrap().is_none());
    }

    #[test]
    fn conflict_is_queued_and_local_kept() {
        let sync = coordinator("client-a");
        let local = sync
            .write_local("doc-1", fields(json!({"status": "draft"})))
            .unwrap();

        let outcome = sync
            .apply_incoming("doc-1", remote("client-b", 1, json!({"status": "published"})))
            .unwrap();

        assert_eq!(outcome.action, ApplyAction::Conflict);
        assert_eq!(sync.store().get("doc-1").unwrap(), Some(local));
        let queued = sync.conflicts().get("doc-1").unwrap();
        assert_eq!(queued.fields[0].path, "status");
    }

    #[test]
    fn manual_resolution_writes_winner() {
        let sync = coordinator("client-a");
        sync.write_local("doc-1", fields(json!({"status": "draft"})))
            .unwrap();
        sync.apply_incoming("doc-1", remote("client-b", 1, json!({"status": "published"})))
            .unwrap();

        let stored = sync
            .resolve_conflict("doc-1", ResolutionChoice::KeepRemote)
            .unwrap();

        assert_eq!(stored.meta.version, 2);
        assert_eq!(stored.fields["status"], "published");
        assert!(sync.conflicts().is_empty());
        assert!(matches!(
            sync.resolve_conflict("doc-1", ResolutionChoice::KeepLocal),
            Err(SyncError::ConflictNotFound(_))
        ));
    }

    #[test]
    fn reserved_keys_are_not_applied() {
        let sync = coordinator("client-a");
        assert!(matches!(
            sync.apply_incoming("__tether/index", remote("client-b", 1, json!({}))),
            Err(SyncError::ReservedKey(_))
        ));
    }

    #[tokio::test]
    async fn offline_skips_and_restore_returns_idle() {
        let sync = coordinator("client-a");

        sync.on_connectivity_change(false);
        assert_eq!(sync.state(), SyncState::Offline);
        assert_eq!(
            sync.sync_now().await,
            CycleOutcome::Skipped(SkipReason::Offline)
        );

        sync.on_connectivity_change(true);
        assert_eq!(sync.state(), SyncState::Idle);
        assert!(matches!(sync.sync_now().await, CycleOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn completed_cycle_persists_marker() {
        let sync = coordinator("client-a");
        assert_eq!(sync.last_sync().unwrap(), None);

        let CycleOutcome::Completed(report) = sync.sync_now().await else {
            panic!("expected completed cycle");
        };
        assert_eq!(report.since, 0);
        assert_eq!(sync.last_sync().unwrap(), Some(5_000));
        assert_eq!(sync.state(), SyncState::Idle);
    }
}
