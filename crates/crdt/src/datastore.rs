//! CRDT datastore (C5): composes the delta-CRDT set ([`CrdtSet`]) with a
//! causal delta DAG ([`taskmesh_dag::DagStore`]) into a replicated
//! key/value store with `put`/`get`/`delete`/`query`, an atomic transaction
//! builder, and a bulk non-delta batch path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use taskmesh_dag::{ApplyError, CausalDelta, DagError, DagStore, DeltaApplier};
use taskmesh_primitives::delta::{Delta, ElementId};
use taskmesh_store::db::{Column, Database, DbIterator, StoreError};
use taskmesh_store::slice::Slice;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use uhlc::HLC;

use crate::set::{CrdtHooks, CrdtSet, NoopHooks, SetError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrdtError {
    #[error("set error: {0}")]
    Set(#[from] SetError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("dag error: {0}")]
    Dag(#[from] DagError),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<ApplyError> for CrdtError {
    fn from(err: ApplyError) -> Self {
        Self::Dag(DagError::from(err))
    }
}

/// Describes how a [`Query`] should filter the middle, free-form segment of
/// a key between a fixed `prefix_base` and a fixed `remainder` suffix.
#[derive(Clone, Copy, Debug)]
pub enum QueryMiddle<'a> {
    /// Accept any middle segment.
    All,
    /// Reject rows whose middle segment equals `exclude`.
    Exclude(&'a [u8]),
}

struct CrdtApplier<D> {
    set: Arc<CrdtSet<D>>,
    hooks: Arc<dyn CrdtHooks>,
}

#[async_trait::async_trait]
impl<D: Database> DeltaApplier<Delta> for CrdtApplier<D> {
    async fn apply(&self, delta: &CausalDelta<Delta>) -> Result<(), ApplyError> {
        let id_of_delta = ElementId::from(delta.id);
        self.set
            .merge(delta.payload.clone(), id_of_delta, &*self.hooks)
            .map_err(|err| ApplyError::Application(err.to_string()))
    }
}

/// Replicated key/value store: `Put`/`Get`/`Delete`/`Has`/`Query`, built on
/// top of [`CrdtSet`] and a local causal delta DAG.
pub struct CrdtDatastore<D> {
    ns: String,
    db: Arc<D>,
    set: Arc<CrdtSet<D>>,
    dag: AsyncMutex<DagStore<Delta>>,
    applier: CrdtApplier<D>,
    hlc: HLC,
    next_local_priority: AtomicU64,
}

impl<D: Database> CrdtDatastore<D> {
    pub fn new(ns: impl Into<String>, db: Arc<D>) -> Self {
        Self::with_hooks(ns, db, Arc::new(NoopHooks))
    }

    pub fn with_hooks(ns: impl Into<String>, db: Arc<D>, hooks: Arc<dyn CrdtHooks>) -> Self {
        let ns = ns.into();
        let set = Arc::new(CrdtSet::new(ns.clone(), Arc::clone(&db)));
        let applier = CrdtApplier {
            set: Arc::clone(&set),
            hooks,
        };
        Self {
            ns,
            db,
            set,
            dag: AsyncMutex::new(DagStore::new([0; 32])),
            applier,
            hlc: HLC::default(),
            next_local_priority: AtomicU64::new(1),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CrdtError> {
        // `elems \ tombs` can be empty while the winner cache's value row is
        // still settling via `recompute_winner`; a removed key must read as
        // absent regardless of what the cache currently holds.
        if !self.set.is_present(key)? {
            return Ok(None);
        }
        Ok(self.set.stored_value(key)?)
    }

    pub fn has(&self, key: &[u8]) -> Result<bool, CrdtError> {
        Ok(self.set.is_present(key)?)
    }

    pub async fn put(&self, key: &[u8], value: &[u8]) -> Result<ElementId, CrdtError> {
        let mut tx = self.begin_transaction();
        tx.add_to_delta(key, value)?;
        tx.publish_delta().await
    }

    pub async fn delete(&self, key: &[u8]) -> Result<ElementId, CrdtError> {
        let mut tx = self.begin_transaction();
        tx.remove_from_delta(key)?;
        tx.publish_delta().await
    }

    /// All `(key, value)` pairs whose key starts with `prefix`.
    pub fn query(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CrdtError> {
        self.query_segmented(prefix, QueryMiddle::All, &[])
    }

    /// `Query(prefix_base, middle, remainder)`: scans keys of the shape
    /// `prefix_base ++ <middle segment> ++ remainder`. `middle =
    /// QueryMiddle::Exclude(x)` rejects rows whose middle segment is
    /// exactly `x`.
    pub fn query_segmented(
        &self,
        prefix_base: &[u8],
        middle: QueryMiddle<'_>,
        remainder: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, CrdtError> {
        let row_prefix = format!("/{}/k/", self.ns).into_bytes();
        let mut out = Vec::new();

        let mut iter = self.db.iter(Column::State)?;
        let _ = iter.seek(Slice::from(row_prefix.clone()))?;

        for (row_key, row_value) in iter.entries() {
            let row_key = row_key?.as_ref().to_vec();
            if !row_key.starts_with(&row_prefix) {
                break;
            }
            let Some(hex_key) = row_key
                .strip_prefix(row_prefix.as_slice())
                .and_then(|rest| rest.strip_suffix(b"/v"))
            else {
                continue;
            };
            let Ok(key) = hex::decode(hex_key) else {
                continue;
            };

            if !key.starts_with(prefix_base) || !key.ends_with(remainder) {
                continue;
            }
            let middle_bytes = &key[prefix_base.len()..key.len() - remainder.len()];
            if let QueryMiddle::Exclude(excluded) = middle {
                if middle_bytes == excluded {
                    continue;
                }
            }

            if !self.set.is_present(&key)? {
                continue;
            }

            out.push((key, row_value?.as_ref().to_vec()));
        }

        Ok(out)
    }

    #[must_use]
    pub fn begin_transaction(&self) -> Transaction<'_, D> {
        Transaction {
            datastore: self,
            delta: Delta::default(),
        }
    }

    #[must_use]
    pub fn begin_batch(&self) -> Batch<'_, D> {
        Batch {
            datastore: self,
            puts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Pure helper unioning two already-constructed deltas (elements and
    /// tombstones), keeping the higher of the two priorities.
    #[must_use]
    pub fn delta_merge(a: Delta, b: Delta) -> Delta {
        a.merge(b)
    }

    async fn publish(&self, delta: Delta) -> Result<ElementId, CrdtError> {
        if delta.is_empty() {
            return Ok(ElementId::from([0; 32]));
        }

        let mut delta = delta;
        delta.priority = self.next_local_priority.fetch_add(1, Ordering::SeqCst);

        let encoded = serde_json::to_vec(&delta)?;
        let id_of_delta = ElementId::new(&encoded);
        for element in &mut delta.elements {
            element.id = id_of_delta;
        }

        let mut dag = self.dag.lock().await;
        let parents = dag.get_heads();
        let causal = CausalDelta::new(
            *id_of_delta.as_bytes(),
            parents,
            delta,
            self.hlc.new_timestamp(),
            [0; 32],
        );
        dag.add_delta(causal, &self.applier).await?;

        Ok(id_of_delta)
    }

    /// Applies a delta received from a peer. Out-of-order arrivals are held
    /// pending until their parents are locally known; ancestor fetching over
    /// the network (if the parent delta itself is missing) is the caller's
    /// responsibility, typically driven by the broadcaster/sync layer.
    pub async fn apply_remote_delta(&self, delta: CausalDelta<Delta>) -> Result<bool, CrdtError> {
        let mut dag = self.dag.lock().await;
        Ok(dag.add_delta(delta, &self.applier).await?)
    }
}

/// Accumulates adds and removes into a single [`Delta`] published
/// atomically. Not isolated from concurrent writers; atomic only with
/// respect to crash and network partial delivery.
pub struct Transaction<'a, D> {
    datastore: &'a CrdtDatastore<D>,
    delta: Delta,
}

impl<D: Database> Transaction<'_, D> {
    pub fn add_to_delta(&mut self, key: &[u8], value: &[u8]) -> Result<(), CrdtError> {
        let add = self.datastore.set.create_delta_add(key, value);
        self.delta = std::mem::take(&mut self.delta).merge(add);
        Ok(())
    }

    pub fn remove_from_delta(&mut self, key: &[u8]) -> Result<(), CrdtError> {
        let remove = self.datastore.set.create_delta_remove(key)?;
        self.delta = std::mem::take(&mut self.delta).merge(remove);
        Ok(())
    }

    pub async fn publish_delta(self) -> Result<ElementId, CrdtError> {
        self.datastore.publish(self.delta).await
    }
}

/// A non-delta-producing bulk-write path: stages raw key/value writes
/// directly against the local backend, bypassing elems/tombs/priority
/// bookkeeping, for bulk loads where per-write replication is not desired.
pub struct Batch<'a, D> {
    datastore: &'a CrdtDatastore<D>,
    puts: Vec<(Vec<u8>, Vec<u8>)>,
    deletes: Vec<Vec<u8>>,
}

impl<D: Database> Batch<'_, D> {
    pub fn put_batch(&mut self, key: &[u8], value: &[u8]) {
        self.puts.push((key.to_vec(), value.to_vec()));
    }

    pub fn delete_batch(&mut self, key: &[u8]) {
        self.deletes.push(key.to_vec());
    }

    pub fn commit_batch(self) -> Result<(), CrdtError> {
        let ns = &self.datastore.ns;
        for (key, value) in self.puts {
            self.datastore.db.put(
                Column::State,
                Slice::from(format!("/{ns}/k/{}/v", hex::encode(&key)).into_bytes()),
                Slice::from(value),
            )?;
        }
        for key in self.deletes {
            self.datastore.db.delete(
                Column::State,
                Slice::from(format!("/{ns}/k/{}/v", hex::encode(&key)).into_bytes()),
            )?;
        }
        Ok(())
    }
}
