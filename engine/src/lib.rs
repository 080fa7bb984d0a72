//! # Tether Engine
//!
//! The deterministic core of an offline-first sync engine.
//!
//! This crate decides what happens when two clients have edited the same
//! record: accept, ignore, merge, or hand both sides to a conflict backlog.
//! It has no knowledge of storage, network or timers; the `tether-client`
//! crate drives it.
//!
//! ## Design Principles
//!
//! - **No IO**: every function takes its inputs, including the current time
//! - **Deterministic**: same inputs always produce same outputs
//! - **Convergent**: two peers merging each other's writes reach the same fields
//! - **Conservative**: fields without a known merge strategy become conflicts,
//!   never silent overwrites
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`VersionedRecord`] is a JSON field map plus [`Metadata`]:
//! - Version number, starting at 1 and never decreasing
//! - Id of the client that produced the version
//! - Created/updated timestamps
//! - blake3 checksum of the canonical field encoding
//!
//! ### Resolution
//!
//! The [`ConflictResolver`] compares versions. A strictly newer remote is
//! accepted, a strictly older one ignored, and equal versions are merged
//! field by field using the [`FieldStrategy`] table. Arrays are set-unioned,
//! objects are merged recursively.
//!
//! ### Conflicts
//!
//! When a merge leaves fields unsettled, both sides are kept in a
//! [`ConflictRecord`] with a [`Severity`]. Last-writer-wins is available as a
//! fallback through [`ConflictRecord::last_writer`].
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_engine::{ConflictResolver, Resolution, VersionedRecord};
//! use serde_json::json;
//!
//! let fields = |v: serde_json::Value| v.as_object().cloned().unwrap();
//!
//! let mut local = VersionedRecord::new(
//!     fields(json!({"tasks": ["t1", "t2"], "priority": "medium"})),
//!     "client-a",
//!     1706745600000,
//! );
//! let mut remote = VersionedRecord::new(
//!     fields(json!({"tasks": ["t1", "t3"], "priority": "high"})),
//!     "client-b",
//!     1706745600000,
//! );
//! local.meta.version = 2;
//! remote.meta.version = 2;
//!
//! let resolver = ConflictResolver::new("client-a");
//! match resolver.resolve(&local, &remote, 1706745660000) {
//!     Resolution::Merged(merged) => {
//!         assert_eq!(merged.meta.version, 3);
//!         assert_eq!(merged.fields["priority"], "high");
//!         assert_eq!(merged.fields["tasks"], json!(["t1", "t2", "t3"]));
//!     }
//!     other => panic!("unexpected resolution: {other:?}"),
//! }
//! ```

pub mod conflict;
pub mod error;
pub mod identity;
pub mod record;
pub mod resolve;
pub mod strategy;

// Re-export main types at crate root
pub use conflict::{ConflictRecord, ConflictSide, Severity};
pub use error::Error;
pub use identity::ClientIdentity;
pub use record::{compute_checksum, Fields, Metadata, VersionedRecord};
pub use resolve::{
    merge_fields, union_arrays, ApplyAction, ApplyReason, ConflictResolver, FieldConflict,
    Resolution,
};
pub use strategy::{FieldStrategy, PRIORITY_RANKING, STATUS_RANKING};

/// Type aliases for clarity
pub type RecordKey = String;
pub type ClientId = String;
pub type Version = u64;
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
