//! Versioned records: a field map plus the metadata envelope that tracks
//! version, ownership, timestamps and integrity.

use crate::{error::Result, ClientId, Error, Timestamp, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field map of a record. Arbitrary JSON-like payload keyed by field name.
pub type Fields = serde_json::Map<String, Value>;

/// Metadata envelope of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Monotonically increasing per key, starts at 1
    pub version: Version,
    /// Client that produced this version
    pub client_id: ClientId,
    /// Set once when the record is first created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// Set on every accepted write, local or merged
    pub updated_at: Timestamp,
    /// blake3 hex digest of the canonical field encoding
    pub checksum: String,
    /// Provenance of a merged version: `[local, remote]` client ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_from: Option<Vec<ClientId>>,
}

/// The unit of synchronized state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord {
    pub fields: Fields,
    pub meta: Metadata,
}

impl VersionedRecord {
    /// Create a new record at version 1.
    pub fn new(fields: Fields, client_id: impl Into<ClientId>, timestamp: Timestamp) -> Self {
        let checksum = compute_checksum(&fields);
        Self {
            fields,
            meta: Metadata {
                version: 1,
                client_id: client_id.into(),
                created_at: timestamp,
                updated_at: timestamp,
                checksum,
                merged_from: None,
            },
        }
    }

    /// Replace the fields with a local edit, bumping the version.
    pub fn update_fields(
        &mut self,
        fields: Fields,
        client_id: impl Into<ClientId>,
        timestamp: Timestamp,
    ) {
        self.fields = fields;
        self.meta.version += 1;
        self.meta.client_id = client_id.into();
        self.meta.updated_at = timestamp;
        self.meta.merged_from = None;
        self.seal();
    }

    /// Recompute the checksum from the current fields.
    pub fn seal(&mut self) {
        self.meta.checksum = compute_checksum(&self.fields);
    }

    /// Verify the stored checksum against a fresh hash of the fields.
    pub fn verify(&self) -> Result<()> {
        let actual = compute_checksum(&self.fields);
        if actual == self.meta.checksum {
            Ok(())
        } else {
            Err(Error::IntegrityMismatch {
                expected: self.meta.checksum.clone(),
                actual,
            })
        }
    }

    pub fn version(&self) -> Version {
        self.meta.version
    }

    pub fn client_id(&self) -> &ClientId {
        &self.meta.client_id
    }

    /// Number of top-level fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Serialize to the stable byte encoding used by persistent stores.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from bytes produced by [`VersionedRecord::to_bytes`].
    ///
    /// Decoding does not verify the checksum; call [`VersionedRecord::verify`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Deterministic hash of a field map. Keys are sorted at every nesting level.
pub fn compute_checksum(fields: &Fields) -> String {
    let mut canonical = String::new();
    write_canonical_map(fields, &mut canonical);
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

fn write_canonical_map(map: &Fields, out: &mut String) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::from(key.as_str()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_map(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
