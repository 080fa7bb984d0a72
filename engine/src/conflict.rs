//! Conflict records: both sides of a key the resolver could not merge.

use crate::{
    record::compute_checksum, ClientId, FieldConflict, Fields, Metadata, RecordKey, Timestamp,
    VersionedRecord,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How far apart the two sides of a conflict are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Classify by the absolute difference in top-level field counts:
    /// more than 5 is high, more than 2 is medium, anything else low.
    pub fn from_field_counts(local: usize, remote: usize) -> Self {
        match local.abs_diff(remote) {
            d if d > 5 => Severity::High,
            d if d > 2 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Which side of a conflict was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSide {
    Local,
    Remote,
}

/// Both versions of a key, preserved until someone resolves them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub key: RecordKey,
    pub local: VersionedRecord,
    pub remote: VersionedRecord,
    pub detected_at: Timestamp,
    pub severity: Severity,
    /// Fields the merge could not settle
    #[serde(default)]
    pub fields: Vec<FieldConflict>,
}

impl ConflictRecord {
    pub fn new(
        key: impl Into<RecordKey>,
        local: VersionedRecord,
        remote: VersionedRecord,
        fields: Vec<FieldConflict>,
        detected_at: Timestamp,
    ) -> Self {
        let severity = Severity::from_field_counts(local.field_count(), remote.field_count());
        Self {
            key: key.into(),
            local,
            remote,
            detected_at,
            severity,
            fields,
        }
    }

    /// Milliseconds since detection (zero if `now` is earlier).
    pub fn age(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.detected_at)
    }

    /// Last-writer-wins selection.
    ///
    /// Later `updatedAt` wins; on a tie the lexicographically greater client
    /// id wins, so every peer picks the same side.
    pub fn last_writer(&self) -> ConflictSide {
        let local = (&self.local.meta.updated_at, &self.local.meta.client_id);
        let remote = (&self.remote.meta.updated_at, &self.remote.meta.client_id);
        match local.cmp(&remote) {
            Ordering::Less => ConflictSide::Remote,
            Ordering::Greater | Ordering::Equal => ConflictSide::Local,
        }
    }

    pub fn side(&self, side: ConflictSide) -> &VersionedRecord {
        match side {
            ConflictSide::Local => &self.local,
            ConflictSide::Remote => &self.remote,
        }
    }

    /// Build the record that settles this conflict with the given fields.
    ///
    /// The version lands above both sides so it supersedes them everywhere.
    pub fn settle(
        &self,
        fields: Fields,
        client_id: impl Into<ClientId>,
        now: Timestamp,
    ) -> VersionedRecord {
        let checksum = compute_checksum(&fields);
        VersionedRecord {
            fields,
            meta: Metadata {
                version: self.local.version().max(self.remote.version()) + 1,
                client_id: client_id.into(),
                created_at: self.local.meta.created_at.min(self.remote.meta.created_at),
                updated_at: now,
                checksum,
                merged_from: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(client: &str, updated_at: u64, value: Value) -> VersionedRecord {
        let Value::Object(fields) = value else {
            panic!("expected object");
        };
        let mut record = VersionedRecord::new(fields, client, 100);
        record.meta.updated_at = updated_at;
        record
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(Severity::from_field_counts(1, 1), Severity::Low);
        assert_eq!(Severity::from_field_counts(1, 3), Severity::Low);
        assert_eq!(Severity::from_field_counts(1, 4), Severity::Medium);
        assert_eq!(Severity::from_field_counts(6, 1), Severity::Medium);
        assert_eq!(Severity::from_field_counts(7, 1), Severity::High);
        assert!(Severity::High > Severity::Low);
    }

    #[test]
    fn conflict_computes_severity() {
        let local = record("a", 1, json!({"status": "draft"}));
        let remote = record("b", 1, json!({"status": "published"}));
        let conflict = ConflictRecord::new("doc", local, remote, vec![], 10);
        assert_eq!(conflict.severity, Severity::Low);
        assert_eq!(conflict.age(25), 15);
        assert_eq!(conflict.age(5), 0);
    }

    #[test]
    fn later_update_wins() {
        let local = record("a", 200, json!({"x": 1}));
        let remote = record("b", 300, json!({"x": 2}));
        let conflict = ConflictRecord::new("k", local, remote, vec![], 0);
        assert_eq!(conflict.last_writer(), ConflictSide::Remote);
    }

    #[test]
    fn tie_breaks_on_client_id() {
        let local = record("client-b", 200, json!({"x": 1}));
        let remote = record("client-a", 200, json!({"x": 2}));
        let conflict = ConflictRecord::new("k", local.clone(), remote.clone(), vec![], 0);
        assert_eq!(conflict.last_writer(), ConflictSide::Local);

        // mirrored on the other peer
        let mirrored = ConflictRecord::new("k", remote, local, vec![], 0);
        assert_eq!(mirrored.last_writer(), ConflictSide::Remote);
    }

    #[test]
    fn settle_supersedes_both_sides() {
        let mut local = record("a", 200, json!({"x": 1}));
        local.meta.version = 4;
        let mut remote = record("b", 300, json!({"x": 2}));
        remote.meta.version = 4;
        remote.meta.created_at = 50;
        let conflict = ConflictRecord::new("k", local, remote, vec![], 0);

        let settled = conflict.settle(conflict.remote.fields.clone(), "a", 999);
        assert_eq!(settled.version(), 5);
        assert_eq!(settled.meta.created_at, 50);
        assert_eq!(settled.meta.updated_at, 999);
        assert!(settled.verify().is_ok());
    }

    #[test]
    fn serialization_format() {
        let conflict = ConflictRecord::new(
            "k",
            record("a", 1, json!({})),
            record("b", 1, json!({})),
            vec![],
            0,
        );
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["severity"], "low");
        assert!(json.get("detectedAt").is_some());
    }
}
