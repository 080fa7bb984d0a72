//! Version comparison and field-level merge.
//!
//! This is the core of determinism. Given the local and remote versions of a
//! record, the resolver decides whether to accept, ignore or merge, without
//! touching any state.
//!
//! # Algorithm
//!
//! 1. Higher version wins outright
//! 2. Equal versions with equal checksums are identical, nothing to do
//! 3. Otherwise merge field by field across the union of both field sets
//! 4. Any field no strategy can settle turns the whole merge into a conflict
//!
//! Before merging, the two sides are ordered by client id. Array union order
//! and every strategy outcome are then the same no matter which peer runs the
//! merge, so two clients that see each other's writes converge.

use crate::{
    record::{compute_checksum, Fields},
    ClientId, FieldStrategy, Metadata, Timestamp, VersionedRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// What happened to an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    /// No local copy existed; incoming stored as-is
    Created,
    /// Incoming replaced the local copy
    Updated,
    /// Incoming discarded
    Ignored,
    /// Both sides merged into a new version
    Merged,
    /// Merge failed; both sides kept in the conflict queue
    Conflict,
}

/// Why an action was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyReason {
    NewRecord,
    NewerVersion,
    OlderVersion,
    Identical,
    FieldMerge,
    UnresolvedFields,
}

/// A field the merge could not settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConflict {
    /// Dotted path from the record root, e.g. `settings.theme`
    pub path: String,
    pub local: Value,
    pub remote: Value,
}

/// Outcome of comparing a local record with an incoming one.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Remote is strictly newer
    AcceptRemote,
    /// Remote is strictly older
    KeepLocal,
    /// Same version, same content
    Identical,
    /// Same version, merged without conflicts
    Merged(VersionedRecord),
    /// Same version, at least one field could not be merged
    Conflict(Vec<FieldConflict>),
}

impl Resolution {
    pub fn action(&self) -> ApplyAction {
        match self {
            Resolution::AcceptRemote => ApplyAction::Updated,
            Resolution::KeepLocal | Resolution::Identical => ApplyAction::Ignored,
            Resolution::Merged(_) => ApplyAction::Merged,
            Resolution::Conflict(_) => ApplyAction::Conflict,
        }
    }

    pub fn reason(&self) -> ApplyReason {
        match self {
            Resolution::AcceptRemote => ApplyReason::NewerVersion,
            Resolution::KeepLocal => ApplyReason::OlderVersion,
            Resolution::Identical => ApplyReason::Identical,
            Resolution::Merged(_) => ApplyReason::FieldMerge,
            Resolution::Conflict(_) => ApplyReason::UnresolvedFields,
        }
    }
}

/// Resolves local and remote versions of the same key.
///
/// Holds only the id of the client doing the resolving, which is recorded
/// as the author of merged versions.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    client_id: ClientId,
}

impl ConflictResolver {
    pub fn new(client_id: impl Into<ClientId>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Compare versions and merge when they are equal.
    pub fn resolve(
        &self,
        local: &VersionedRecord,
        remote: &VersionedRecord,
        now: Timestamp,
    ) -> Resolution {
        match remote.version().cmp(&local.version()) {
            Ordering::Greater => Resolution::AcceptRemote,
            Ordering::Less => Resolution::KeepLocal,
            Ordering::Equal if local.meta.checksum == remote.meta.checksum => {
                Resolution::Identical
            }
            Ordering::Equal => match merge_records(local, remote) {
                Ok(fields) => Resolution::Merged(self.merged_record(local, remote, fields, now)),
                Err(conflicts) => Resolution::Conflict(conflicts),
            },
        }
    }

    fn merged_record(
        &self,
        local: &VersionedRecord,
        remote: &VersionedRecord,
        fields: Fields,
        now: Timestamp,
    ) -> VersionedRecord {
        let checksum = compute_checksum(&fields);
        VersionedRecord {
            fields,
            meta: Metadata {
                version: local.version().max(remote.version()) + 1,
                client_id: self.client_id.clone(),
                created_at: local.meta.created_at.min(remote.meta.created_at),
                updated_at: now,
                checksum,
                merged_from: Some(vec![local.client_id().clone(), remote.client_id().clone()]),
            },
        }
    }
}

/// Merge the fields of two equal-version records, oriented by client id.
///
/// Conflicts are reported from the caller's point of view (`local` and
/// `remote` keep their meaning regardless of orientation).
fn merge_records(
    local: &VersionedRecord,
    remote: &VersionedRecord,
) -> Result<Fields, Vec<FieldConflict>> {
    let swapped = remote.client_id() < local.client_id();
    let (first, second) = if swapped {
        (&remote.fields, &local.fields)
    } else {
        (&local.fields, &remote.fields)
    };

    merge_fields(first, second).map_err(|conflicts| {
        if !swapped {
            return conflicts;
        }
        conflicts
            .into_iter()
            .map(|c| FieldConflict {
                path: c.path,
                local: c.remote,
                remote: c.local,
            })
            .collect()
    })
}

/// Field-level merge of two maps.
///
/// Arrays keep the elements of `first` followed by elements of `second` not
/// already present. Element identity is deep equality, so an element edited
/// on both sides shows up twice rather than conflicting.
pub fn merge_fields(first: &Fields, second: &Fields) -> Result<Fields, Vec<FieldConflict>> {
    let mut conflicts = Vec::new();
    let merged = merge_maps(first, second, "", &mut conflicts);
    if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(conflicts)
    }
}

fn merge_maps(
    first: &Fields,
    second: &Fields,
    prefix: &str,
    conflicts: &mut Vec<FieldConflict>,
) -> Fields {
    let names: BTreeSet<&String> = first.keys().chain(second.keys()).collect();
    let mut merged = Fields::new();

    for name in names {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };

        let value = match (first.get(name), second.get(name)) {
            (Some(a), Some(b)) => merge_value(name, &path, a, b, conflicts),
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => continue,
        };
        merged.insert(name.clone(), value);
    }

    merged
}

fn merge_value(
    name: &str,
    path: &str,
    a: &Value,
    b: &Value,
    conflicts: &mut Vec<FieldConflict>,
) -> Value {
    if a == b {
        return a.clone();
    }

    match (a, b) {
        (Value::Array(x), Value::Array(y)) => Value::Array(union_arrays(x, y)),
        (Value::Object(x), Value::Object(y)) => Value::Object(merge_maps(x, y, path, conflicts)),
        _ if same_scalar_kind(a, b) => match FieldStrategy::for_field(name).resolve(a, b) {
            Some(winner) => winner,
            None => {
                conflicts.push(FieldConflict {
                    path: path.to_string(),
                    local: a.clone(),
                    remote: b.clone(),
                });
                a.clone()
            }
        },
        // type mismatch
        _ => {
            conflicts.push(FieldConflict {
                path: path.to_string(),
                local: a.clone(),
                remote: b.clone(),
            });
            a.clone()
        }
    }
}

/// Set-union of two arrays preserving the order of `first`.
pub fn union_arrays(first: &[Value], second: &[Value]) -> Vec<Value> {
    let mut out = first.to_vec();
    for item in second {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

fn same_scalar_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
    )
}
