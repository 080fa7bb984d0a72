//! Client identity used to attribute writes and break symmetric ties.
//!
//! Identifiers are UUIDv7: a millisecond timestamp prefix followed by random
//! bits. Collisions would only skew tie-break fairness, never correctness,
//! so nothing here needs to be cryptographically strong or persisted.

use crate::ClientId;
use std::fmt;
use uuid::Uuid;

/// Process-lifetime identity of this client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity {
    id: ClientId,
}

impl ClientIdentity {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
        }
    }

    /// Wrap an existing identifier (tests, or hosts that persist their own).
    pub fn from_id(id: impl Into<ClientId>) -> Self {
        Self { id: id.into() }
    }

    /// The identifier string.
    pub fn id(&self) -> &ClientId {
        &self.id
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl AsRef<str> for ClientIdentity {
    fn as_ref(&self) -> &str {
        &self.id
    }
}
