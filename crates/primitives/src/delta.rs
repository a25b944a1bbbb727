use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// Witness identifier for a single add or remove operation on a key. Two adds
/// of the same key carry distinct ids so the observed-remove set can tell
/// them apart.
pub type ElementId = Hash;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeltaElement {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub id: ElementId,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeltaTombstone {
    pub key: Vec<u8>,
    pub id: ElementId,
}

/// A CRDT delta: a priority plus the elements added and the ids tombstoned.
/// Deltas are encoded as the payload of a DAG node; the node's own [`crate::block::BlockId`]
/// becomes the delta's identity once published.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub priority: u64,
    pub elements: Vec<DeltaElement>,
    pub tombstones: Vec<DeltaTombstone>,
}

impl Delta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.tombstones.is_empty()
    }

    /// Pure, non-mutating union of two deltas: concatenates elements, unions
    /// tombstones, and keeps the higher of the two priorities.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.priority = self.priority.max(other.priority);
        self.elements.extend(other.elements);
        for tombstone in other.tombstones {
            if !self.tombstones.iter().any(|t| t.id == tombstone.id) {
                self.tombstones.push(tombstone);
            }
        }
        self
    }
}
