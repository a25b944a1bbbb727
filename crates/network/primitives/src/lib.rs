//! Wire-level types and trait boundaries shared between the processing
//! layer (`taskmesh-processing`) and the libp2p-backed network
//! implementation (`taskmesh-network`). Kept free of swarm machinery so
//! higher layers can be unit-tested against fakes, matching the split the
//! teacher codebase already draws between its `-primitives` crates and the
//! actor that owns the live swarm.

use async_trait::async_trait;
use libp2p::gossipsub::IdentTopic;
pub use libp2p::gossipsub::TopicHash;
pub use libp2p_identity::PeerId;
use taskmesh_primitives::block::BlockId;
use thiserror::Error;

/// C3: a FIFO of opaque byte payloads bound to one gossip topic.
/// `broadcast` is fire-and-forget best-effort; `next` drains the oldest
/// received payload, or resolves to `None` once the broadcaster is closed.
/// No ordering is implied across distinct senders.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, data: Vec<u8>) -> Result<(), BroadcastError>;

    async fn next(&self) -> Option<Vec<u8>>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BroadcastError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("not subscribed to this topic")]
    NotSubscribed,
}

/// C6 provider discovery half of the block accessor: "ask the overlay for
/// providers of `cid`" (spec step 1). A DHT-backed implementation realizes
/// this as a Kademlia `get_providers` query.
#[async_trait]
pub trait ProviderDiscovery: Send + Sync {
    async fn find_providers(&self, id: &BlockId) -> Result<Vec<PeerId>, DiscoveryError>;

    /// Announces the local node as a provider for `id`, the write-side
    /// counterpart used once a `Fetch` completes so future `find_providers`
    /// calls elsewhere can find this peer.
    async fn announce(&self, id: &BlockId) -> Result<(), DiscoveryError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    #[error("provider query failed: {0}")]
    Query(String),
}

/// C6 per-peer fetch half: the bitswap/graphsync wire protocol boundary
/// named out of scope in the specification, assumed to expose exactly this
/// `RequestBlock(cid, peer) -> bytes` shape.
#[async_trait]
pub trait BlockRequester: Send + Sync {
    async fn request(&self, peer: PeerId, id: &BlockId) -> Result<Option<Vec<u8>>, RequestError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("peer did not respond before the request timeout")]
    Timeout,
    #[error("request failed: {0}")]
    Other(String),
}

/// Canonical topic names derived the same way by every component that needs
/// to agree on a gossipsub topic without exchanging it out of band.
pub mod topics {
    use super::IdentTopic;

    /// The grid-wide channel C11 subscribes to on startup.
    #[must_use]
    pub fn grid_channel() -> IdentTopic {
        IdentTopic::new("taskmesh/grid/1")
    }

    /// The per-task room channel, named by the task id's canonical string
    /// form so every peer derives the identical topic independently.
    #[must_use]
    pub fn processing_room(task_id: &str) -> IdentTopic {
        IdentTopic::new(format!("taskmesh/room/{task_id}"))
    }
}
