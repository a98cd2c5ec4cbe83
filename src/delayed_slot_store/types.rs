//! DelayedSlotStore types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unix timestamp (seconds) of a liveness-positive observation
pub type SlotTimestamp = i64;

/// Observation slots grouped by entity for one delivery attempt
///
/// Serialized as a bare JSON object: `{"cam1": [100, 200], "cam2": [150]}`.
/// Each entity's sequence is append-only; it keeps insertion order and may
/// carry timestamps from several failed delivery cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotBatch(BTreeMap<String, Vec<SlotTimestamp>>);

impl SlotBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation for an entity
    pub fn push(&mut self, entity_id: impl Into<String>, observed_at: SlotTimestamp) {
        self.0.entry(entity_id.into()).or_default().push(observed_at);
    }

    /// Append every sequence of `other` after the existing one
    ///
    /// Loss-free: no sequence shrinks, duplicates are kept.
    pub fn merge(&mut self, other: SlotBatch) {
        for (entity_id, timestamps) in other.0 {
            self.0.entry(entity_id).or_default().extend(timestamps);
        }
    }

    /// True when no entity has a slot
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|slots| slots.is_empty())
    }

    /// Number of entities present
    pub fn entity_count(&self) -> usize {
        self.0.len()
    }

    /// Total number of slots across entities
    pub fn slot_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Slots for one entity
    pub fn get(&self, entity_id: &str) -> Option<&[SlotTimestamp]> {
        self.0.get(entity_id).map(Vec::as_slice)
    }

    /// Entity ids in the batch
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Vec<SlotTimestamp>); N]> for SlotBatch {
    fn from(entries: [(K, Vec<SlotTimestamp>); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(entity_id, slots)| (entity_id.into(), slots))
                .collect(),
        )
    }
}

/// Result of one drain attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue was empty, no delivery call made
    Empty,
    /// Collector acknowledged; queue cleared
    Delivered { entities: usize, slots: usize },
    /// Collector did not acknowledge; queue left intact
    Retained { entities: usize, slots: usize },
}
