//! # Tether Client
//!
//! The runtime half of the sync engine: durable storage, the conflict
//! backlog and the [`SyncCoordinator`] that pushes, pulls and settles.
//!
//! Storage and network are supplied by the host through the
//! [`PersistentStore`] and [`Transport`] traits. [`MemoryStore`] is a ready
//! backend for tests and ephemeral clients.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_client::{
//!     MemoryStore, RecordStore, SyncConfig, SyncCoordinator, Transport,
//! };
//! use tether_engine::ClientIdentity;
//!
//! # async fn run(transport: Arc<dyn Transport>) -> tether_client::Result<()> {
//! let store = Arc::new(RecordStore::open(Arc::new(MemoryStore::new()))?);
//! let config = SyncConfig::load().unwrap_or_default();
//!
//! let sync = Arc::new(SyncCoordinator::new(
//!     ClientIdentity::generate(),
//!     store,
//!     transport,
//!     config,
//! )?);
//!
//! let fields = serde_json::json!({"title": "Groceries"});
//! sync.write_local("list-1", fields.as_object().cloned().unwrap_or_default())?;
//!
//! let handle = sync.start_sync();
//! // ...
//! handle.abort();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod queue;
pub mod record_store;
pub mod storage;
pub mod transport;

pub use config::{ConfigError, SyncConfig};
pub use coordinator::{
    AbortReason, ApplyOutcome, CycleOutcome, ResolutionChoice, SkipReason, SyncCoordinator,
    SyncReport, SyncState,
};
pub use error::{Result, SyncError};
pub use queue::ConflictQueue;
pub use record_store::{is_reserved, KeyGuard, RecordStore, RESERVED_PREFIX};
pub use storage::{MemoryStore, PersistentStore, StorageError};
pub use transport::{PullRequest, PullResponse, PushRequest, SyncEntry, Transport, TransportError};
