//! Named-field merge strategies for scalar values.
//!
//! When two versions of a record disagree on a scalar field, the field name
//! selects a strategy. Names are normalized (lowercase, `_`/`-` removed) so
//! `updated_at`, `updatedAt` and `UPDATED-AT` all select the same arm.
//! Unrecognized names fall through to [`FieldStrategy::Manual`].

use chrono::DateTime;
use serde_json::Value;
use std::cmp::Ordering;

/// Status values from lowest to highest rank.
pub const STATUS_RANKING: &[&str] = &["inactive", "pending", "active"];

/// Priority values from lowest to highest rank.
pub const PRIORITY_RANKING: &[&str] = &["low", "medium", "high", "urgent"];

/// How a differing scalar field is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStrategy {
    /// Numerically or temporally larger value wins (timestamps, counters)
    Max,
    /// Longer string wins (free-text notes, descriptions)
    Longest,
    /// Higher position in the ranking wins; numbers fall back to `Max`
    Ranked(&'static [&'static str]),
    /// No automatic resolution; the field becomes a conflict
    Manual,
}

impl FieldStrategy {
    /// Look up the strategy for a field name.
    pub fn for_field(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "updatedat" | "modifiedat" | "lastmodified" | "lastupdated" | "timestamp"
            | "version" | "revision" | "rev" | "sequence" | "seq" => FieldStrategy::Max,
            "description" | "notes" | "note" | "summary" | "content" | "body" | "comments" => {
                FieldStrategy::Longest
            }
            "status" | "state" => FieldStrategy::Ranked(STATUS_RANKING),
            "priority" => FieldStrategy::Ranked(PRIORITY_RANKING),
            _ => FieldStrategy::Manual,
        }
    }

    /// Pick a winner between two differing scalars of the same JSON type.
    ///
    /// Returns `None` when the strategy cannot decide: unknown field, values
    /// outside the ranking, unparseable timestamps, or an exact tie. The
    /// result never depends on argument order.
    pub fn resolve(self, a: &Value, b: &Value) -> Option<Value> {
        let ordering = match self {
            FieldStrategy::Max => compare_max(a, b)?,
            FieldStrategy::Longest => compare_length(a, b)?,
            FieldStrategy::Ranked(ranking) => match (a, b) {
                (Value::Number(_), Value::Number(_)) => compare_max(a, b)?,
                _ => rank(ranking, a)?.cmp(&rank(ranking, b)?),
            },
            FieldStrategy::Manual => return None,
        };

        match ordering {
            Ordering::Greater => Some(a.clone()),
            Ordering::Less => Some(b.clone()),
            Ordering::Equal => None,
        }
    }
}

fn compare_max(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            let x = DateTime::parse_from_rfc3339(x).ok()?;
            let y = DateTime::parse_from_rfc3339(y).ok()?;
            Some(x.cmp(&y))
        }
        _ => None,
    }
}

fn compare_length(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.chars().count().cmp(&y.chars().count())),
        _ => None,
    }
}

fn rank(ranking: &[&str], value: &Value) -> Option<usize> {
    let value = value.as_str()?;
    ranking
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(value))
}
