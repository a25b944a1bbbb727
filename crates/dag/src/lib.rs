//! DAG (Directed Acyclic Graph) for causal delta tracking
//!
//! This crate provides a pure DAG implementation for managing causal relationships
//! between deltas. It's independent of storage and network layers, making it
//! easy to test and reuse.
//!
//! ## Core Concepts
//!
//! - **CausalDelta**: A delta with parent references (content-addressed)
//! - **DagStore**: Manages DAG topology and applies deltas in topological order
//! - **DeltaApplier**: Trait for applying deltas (dependency injection)

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod blockstore;

pub use blockstore::{BlockStore, BlockStoreError, Node};

/// A causal delta with parent references
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalDelta<T> {
    /// Unique delta ID (content hash)
    pub id: [u8; 32],

    /// Parent delta IDs (for causal ordering)
    pub parents: Vec<[u8; 32]>,

    /// The actual delta payload (generic)
    pub payload: T,

    /// Hybrid Logical Clock timestamp for fine-grained causal ordering
    pub hlc: uhlc::Timestamp,

    /// Expected root hash after applying this delta
    pub expected_root_hash: [u8; 32],
}

impl<T> CausalDelta<T> {
    pub fn new(
        id: [u8; 32],
        parents: Vec<[u8; 32]>,
        payload: T,
        hlc: uhlc::Timestamp,
        expected_root_hash: [u8; 32],
    ) -> Self {
        Self {
            id,
            parents,
            payload,
            hlc,
            expected_root_hash,
        }
    }

    /// Convenience constructor for tests that uses a default HLC
    #[cfg(any(test, feature = "testing"))]
    pub fn new_test(id: [u8; 32], parents: Vec<[u8; 32]>, payload: T) -> Self {
        let hlc_id = uhlc::ID::try_from(1_u128).expect("1 is a valid HLC id");
        Self {
            id,
            parents,
            payload,
            hlc: uhlc::Timestamp::new(uhlc::NTP64(0), hlc_id),
            expected_root_hash: [0; 32],
        }
    }
}

/// Trait for applying deltas to underlying storage
///
/// The DAG doesn't know how to apply deltas - it delegates to this trait.
/// This allows testing with mock appliers and using real storage in production.
#[async_trait::async_trait]
pub trait DeltaApplier<T> {
    async fn apply(&self, delta: &CausalDelta<T>) -> Result<(), ApplyError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApplyError {
    #[error("Failed to apply delta: {0}")]
    Application(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DagError {
    #[error("Delta already exists: {0:?}")]
    DuplicateDelta([u8; 32]),

    #[error("Failed to apply delta: {0}")]
    ApplyFailed(#[from] ApplyError),
}

/// Tracks a pending delta with timeout metadata
#[derive(Debug, Clone)]
struct PendingDelta<T> {
    delta: CausalDelta<T>,
    received_at: Instant,
}

impl<T> PendingDelta<T> {
    fn new(delta: CausalDelta<T>) -> Self {
        Self {
            delta,
            received_at: Instant::now(),
        }
    }

    fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Statistics about the DAG store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DagStats {
    pub total_deltas: usize,
    pub applied_deltas: usize,
    pub pending_deltas: usize,
    pub head_count: usize,
}

/// Statistics about pending deltas
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingStats {
    pub count: usize,
    pub oldest_age_secs: u64,
    pub total_missing_parents: usize,
}

/// DAG-based delta store
///
/// Manages causal deltas in a DAG structure, applying them in topological order.
/// Generic over the delta payload type.
#[derive(Debug)]
pub struct DagStore<T> {
    /// All deltas we've seen
    deltas: HashMap<[u8; 32], CausalDelta<T>>,

    /// Deltas we've successfully applied
    applied: HashSet<[u8; 32]>,

    /// Deltas waiting for parents
    pending: HashMap<[u8; 32], PendingDelta<T>>,

    /// Current heads (deltas with no children yet)
    heads: HashSet<[u8; 32]>,

    /// Root delta (genesis)
    #[allow(dead_code)]
    root: [u8; 32],
}

impl<T: Clone> DagStore<T> {
    /// Creates a new DAG store with the given root
    pub fn new(root: [u8; 32]) -> Self {
        let mut applied = HashSet::new();
        applied.insert(root);

        let mut heads = HashSet::new();
        heads.insert(root);

        Self {
            deltas: HashMap::new(),
            applied,
            pending: HashMap::new(),
            heads,
            root,
        }
    }

    /// Add a delta to the DAG
    ///
    /// Returns:
    /// - `Ok(true)` if applied immediately
    /// - `Ok(false)` if pending (waiting for parents)
    /// - `Err(DagError)` if delta already exists or application fails
    pub async fn add_delta(
        &mut self,
        delta: CausalDelta<T>,
        applier: &impl DeltaApplier<T>,
    ) -> Result<bool, DagError> {
        let delta_id = delta.id;

        // Skip if already seen
        if self.deltas.contains_key(&delta_id) {
            return Ok(false); // Silently skip duplicates
        }

        // Store delta in memory
        self.deltas.insert(delta_id, delta.clone());

        // Check if we can apply immediately
        if self.can_apply(&delta) {
            self.apply_delta(delta, applier).await?;
            Ok(true)
        } else {
            // Missing parents - store as pending
            self.pending.insert(delta_id, PendingDelta::new(delta));
            Ok(false)
        }
    }

    /// Check if a delta can be applied (all parents applied)
    fn can_apply(&self, delta: &CausalDelta<T>) -> bool {
        delta.parents.iter().all(|p| self.applied.contains(p))
    }

    /// Apply a delta using the provided applier
    fn apply_delta<'a>(
        &'a mut self,
        delta: CausalDelta<T>,
        applier: &'a impl DeltaApplier<T>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), DagError>> + 'a>> {
        Box::pin(async move {
            // Apply via the applier
            applier.apply(&delta).await?;

            // Mark as applied
            self.applied.insert(delta.id);

            // Update heads: remove parents, add this delta
            for parent in &delta.parents {
                self.heads.remove(parent);
            }
            self.heads.insert(delta.id);

            // Try to apply pending deltas
            self.apply_pending(applier).await?;

            Ok(())
        })
    }

    /// Apply pending deltas whose parents are now available
    async fn apply_pending(&mut self, applier: &impl DeltaApplier<T>) -> Result<(), DagError> {
        let mut applied_any = true;

        while applied_any {
            applied_any = false;

            // Find deltas that are now ready
            let ready: Vec<[u8; 32]> = self
                .pending
                .iter()
                .filter(|(_, pending)| self.can_apply(&pending.delta))
                .map(|(id, _)| *id)
                .collect();

            for id in ready {
                if let Some(pending) = self.pending.remove(&id) {
                    self.apply_delta(pending.delta, applier).await?;
                    applied_any = true;
                }
            }
        }

        Ok(())
    }

    /// Get missing parent IDs
    pub fn get_missing_parents(&self) -> Vec<[u8; 32]> {
        let mut missing = HashSet::new();

        for pending in self.pending.values() {
            for parent in &pending.delta.parents {
                if !self.deltas.contains_key(parent) {
                    missing.insert(*parent);
                }
            }
        }

        missing.into_iter().collect()
    }

    /// Cleanup stale pending deltas (timeout eviction)
    pub fn cleanup_stale(&mut self, max_age: Duration) -> usize {
        let initial_count = self.pending.len();

        self.pending.retain(|_id, pending| pending.age() <= max_age);

        initial_count - self.pending.len()
    }

    /// Get statistics for pending deltas
    pub fn pending_stats(&self) -> PendingStats {
        if self.pending.is_empty() {
            return PendingStats::default();
        }

        let oldest_age = self
            .pending
            .values()
            .map(|p| p.age())
            .max()
            .unwrap_or(Duration::ZERO);

        let total_missing: usize = self
            .pending
            .values()
            .map(|p| {
                p.delta
                    .parents
                    .iter()
                    .filter(|&parent| !self.applied.contains(parent))
                    .count()
            })
            .sum();

        PendingStats {
            count: self.pending.len(),
            oldest_age_secs: oldest_age.as_secs(),
            total_missing_parents: total_missing,
        }
    }

    /// Get current heads (for creating new deltas)
    pub fn get_heads(&self) -> Vec<[u8; 32]> {
        self.heads.iter().copied().collect()
    }

    /// Get all deltas since a common ancestor (for sync)
    pub fn get_deltas_since(&self, ancestor: [u8; 32]) -> Vec<CausalDelta<T>> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from_iter(self.heads.iter().copied());

        while let Some(id) = queue.pop_front() {
            if visited.contains(&id) || id == ancestor {
                continue;
            }

            visited.insert(id);

            if let Some(delta) = self.deltas.get(&id) {
                result.push(delta.clone());

                for parent in &delta.parents {
                    queue.push_back(*parent);
                }
            }
        }

        result
    }

    /// Check if we have a specific delta
    pub fn has_delta(&self, id: &[u8; 32]) -> bool {
        self.deltas.contains_key(id)
    }

    /// Get a delta by ID
    pub fn get_delta(&self, id: &[u8; 32]) -> Option<&CausalDelta<T>> {
        self.deltas.get(id)
    }

    /// Get statistics
    pub fn stats(&self) -> DagStats {
        DagStats {
            total_deltas: self.deltas.len(),
            applied_deltas: self.applied.len(),
            pending_deltas: self.pending.len(),
            head_count: self.heads.len(),
        }
    }
}


#[cfg(test)]
mod tests_convergence;
