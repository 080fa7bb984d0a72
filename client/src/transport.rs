//! Network transport contract and its JSON wire shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_engine::{ClientId, RecordKey, Timestamp, VersionedRecord};

/// A keyed record as carried over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
    pub key: RecordKey,
    pub record: VersionedRecord,
}

impl SyncEntry {
    pub fn new(key: impl Into<RecordKey>, record: VersionedRecord) -> Self {
        Self {
            key: key.into(),
            record,
        }
    }
}

/// Request body for a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Client's id
    pub client_id: ClientId,
    /// Records owned by the client
    pub records: Vec<SyncEntry>,
}

/// Request body for a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub client_id: ClientId,
    /// Last successful sync (milliseconds since epoch, 0 for a full pull)
    pub since: Timestamp,
}

/// Response body for a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub records: Vec<SyncEntry>,
}

/// Network failure. Never retried within a cycle.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Request/response channel to the remote store.
///
/// The coordinator wraps every call in its own timeout, so implementations
/// need not enforce one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload records owned by `client_id`.
    async fn push(&self, client_id: &str, records: Vec<SyncEntry>) -> Result<(), TransportError>;

    /// Download every record changed remotely since `since`.
    async fn pull(&self, client_id: &str, since: Timestamp)
        -> Result<Vec<SyncEntry>, TransportError>;
}
