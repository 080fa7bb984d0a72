//! Unified error handling for the sync client.

use crate::storage::StorageError;
use crate::transport::TransportError;
use tether_engine::{RecordKey, Version};

/// Client error type.
///
/// Merge conflicts and stale writes are not errors: they come back as
/// [`ApplyAction`](tether_engine::ApplyAction) values.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Checksum mismatch or undecodable bytes. Never trusted as a record.
    #[error("integrity check failed for '{key}': {source}")]
    Integrity {
        key: RecordKey,
        #[source]
        source: tether_engine::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("engine error: {0}")]
    Engine(#[from] tether_engine::Error),

    /// A write would move a key's version backwards.
    #[error("refusing to replace '{key}' version {stored} with older version {attempted}")]
    StaleWrite {
        key: RecordKey,
        stored: Version,
        attempted: Version,
    },

    #[error("key '{0}' is in the reserved namespace")]
    ReservedKey(RecordKey),

    #[error("no conflict queued for '{0}'")]
    ConflictNotFound(RecordKey),
}

impl SyncError {
    pub(crate) fn integrity(key: &str, source: tether_engine::Error) -> Self {
        SyncError::Integrity {
            key: key.to_string(),
            source,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
