//! Merged latest-state snapshot across all adapters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::contract::StateMap;

/// Latest reported state for one adapter identity.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    /// Accumulated key/value state. Keys are overwritten in place as new
    /// events arrive; sibling keys from earlier events are kept.
    pub data: StateMap,
    /// Timestamp of the most recent observation merged into `data`.
    pub observed_at: DateTime<Utc>,
    /// Set when the owning adapter stopped or its loop failed. A stale
    /// entry still carries last-known context rather than leaving a hole.
    pub stale: bool,
}

impl SnapshotEntry {
    pub(crate) fn empty(observed_at: DateTime<Utc>) -> Self {
        Self {
            data: StateMap::new(),
            observed_at,
            stale: false,
        }
    }

    /// Shallow key merge: matching keys overwritten, others kept.
    pub(crate) fn merge(&mut self, payload: &StateMap, observed_at: DateTime<Utc>) {
        for (key, value) in payload {
            self.data.insert(key.clone(), value.clone());
        }
        self.observed_at = observed_at;
        self.stale = false;
    }
}

/// Consistent point-in-time copy of all adapters' latest state.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub entries: HashMap<String, SnapshotEntry>,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn get(&self, source: &str) -> Option<&SnapshotEntry> {
        self.entries.get(source)
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
