//! DAG syncer (C2): fetches a CID transitively from peers, using the
//! content-addressed block store ([`taskmesh_dag::BlockStore`]) as local
//! cache. Traversal order is BFS; concurrent [`DagSyncer::fetch`] calls for
//! the same root coalesce into a single in-flight traversal.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use taskmesh_dag::{BlockStore, BlockStoreError, Node};
use taskmesh_primitives::block::BlockId;
use taskmesh_store::db::Database;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Fetches a single block from the network. Implemented by the block
/// accessor (C6); kept as a trait here so the syncer can be tested without a
/// live swarm.
#[async_trait::async_trait]
pub trait BlockFetcher: Send + Sync {
    async fn fetch(&self, id: &BlockId) -> Result<Node, FetchError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("no provider responded before the request timeout")]
    Timeout,
    #[error("fetch failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("local store error: {0}")]
    Store(#[from] BlockStoreError),
    #[error("fetch incomplete: {0}")]
    FetchIncomplete(#[from] FetchError),
}

/// Orchestrates `Fetch(root) -> ok` over a local [`BlockStore`] and a
/// [`BlockFetcher`].
pub struct DagSyncer<D, F> {
    blocks: Arc<BlockStore<D>>,
    fetcher: F,
    in_flight: DashMap<BlockId, Arc<Notify>>,
}

impl<D: Database, F: BlockFetcher> DagSyncer<D, F> {
    pub fn new(blocks: Arc<BlockStore<D>>, fetcher: F) -> Self {
        Self {
            blocks,
            fetcher,
            in_flight: DashMap::new(),
        }
    }

    /// Recursively ensures every block transitively linked from `root` is
    /// present locally. Idempotent and safe under crash: a partial fetch
    /// leaves a partial local DAG that a later call completes.
    pub async fn fetch(&self, root: &BlockId) -> Result<(), SyncError> {
        loop {
            if let Some(notify) = self.in_flight.get(root).map(|entry| entry.value().clone()) {
                debug!(?root, "coalescing into in-flight fetch");
                notify.notified().await;
                return Ok(());
            }

            let notify = Arc::new(Notify::new());
            match self.in_flight.entry(root.clone()) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let _ = slot.insert(notify);
                    break;
                }
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
            }
        }

        let result = self.run_fetch(root).await;

        if let Some((_, notify)) = self.in_flight.remove(root) {
            notify.notify_waiters();
        }

        result
    }

    async fn run_fetch(&self, root: &BlockId) -> Result<(), SyncError> {
        let mut queue = VecDeque::from([root.clone()]);
        let mut visited = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }

            let node = if self.blocks.has_block(&id)? {
                self.blocks.get(&id)?
            } else {
                let node = self.fetcher.fetch(&id).await?;
                let stored_id = self.blocks.put(&node)?;
                if stored_id != id {
                    warn!(?id, ?stored_id, "fetched node does not hash to the requested id");
                }
                node
            };

            queue.extend(node.links);
        }

        Ok(())
    }
}
