//! Thin facade the rest of the process talks to, mirroring the teacher's
//! `NetworkClient` wrapping `Addr<NetworkManager>`. Nothing here touches the
//! swarm directly; every method is a `.send(...).await` of a message from
//! `crate::messages`.

use actix::Addr;
use libp2p::gossipsub::IdentTopic;
use libp2p::{Multiaddr, PeerId};
use taskmesh_network_primitives::{BroadcastError, Broadcaster, DiscoveryError, ProviderDiscovery, RequestError};
use taskmesh_primitives::block::BlockId;
use tokio::sync::Mutex;

use crate::manager::NetworkManager;
use crate::messages::{
    AnnounceProvider, Dial, MeshPeerCount, MeshPeers, PeerCount, Publish, QueryProviders, RequestBlockFrom, Subscribe,
    Unsubscribe,
};

#[derive(Clone)]
pub struct NetworkClient {
    manager: Addr<NetworkManager>,
}

impl NetworkClient {
    #[must_use]
    pub const fn new(manager: Addr<NetworkManager>) -> Self {
        Self { manager }
    }

    pub async fn dial(&self, addr: Multiaddr) -> eyre::Result<()> {
        self.manager.send(Dial(addr)).await?
    }

    /// Subscribes to `topic` and returns a handle implementing
    /// `taskmesh_network_primitives::Broadcaster` — C3's entry point.
    pub async fn subscribe(&self, topic: IdentTopic) -> eyre::Result<TopicBroadcaster> {
        let receiver = self.manager.send(Subscribe(topic.clone())).await??;
        Ok(TopicBroadcaster {
            manager: self.manager.clone(),
            topic,
            incoming: Mutex::new(receiver),
        })
    }

    pub async fn peer_count(&self) -> usize {
        self.manager.send(PeerCount).await.unwrap_or(0)
    }

    pub async fn mesh_peer_count(&self, topic: &IdentTopic) -> usize {
        self.manager.send(MeshPeerCount(topic.hash())).await.unwrap_or(0)
    }

    pub async fn mesh_peers(&self, topic: &IdentTopic) -> Vec<PeerId> {
        self.manager.send(MeshPeers(topic.hash())).await.unwrap_or_default()
    }

    pub async fn request_block_from(&self, peer: PeerId, id: BlockId) -> Result<Option<Vec<u8>>, RequestError> {
        self.manager
            .send(RequestBlockFrom { peer, id })
            .await
            .unwrap_or_else(|_| Err(RequestError::Other("network manager actor stopped".to_owned())))
    }
}

#[async_trait::async_trait]
impl ProviderDiscovery for NetworkClient {
    async fn find_providers(&self, id: &BlockId) -> Result<Vec<PeerId>, DiscoveryError> {
        self.manager
            .send(QueryProviders(id.clone()))
            .await
            .unwrap_or_else(|_| Err(DiscoveryError::Query("network manager actor stopped".to_owned())))
    }

    async fn announce(&self, id: &BlockId) -> Result<(), DiscoveryError> {
        self.manager
            .send(AnnounceProvider(id.clone()))
            .await
            .unwrap_or_else(|_| Err(DiscoveryError::Query("network manager actor stopped".to_owned())))
    }
}

/// A single topic's gossip channel: publishing goes out over gossipsub,
/// `next` drains messages the swarm driver routed to this topic.
pub struct TopicBroadcaster {
    manager: Addr<NetworkManager>,
    topic: IdentTopic,
    incoming: Mutex<tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Drop for TopicBroadcaster {
    fn drop(&mut self) {
        self.manager.do_send(Unsubscribe(self.topic.clone()));
    }
}

#[async_trait::async_trait]
impl Broadcaster for TopicBroadcaster {
    async fn broadcast(&self, data: Vec<u8>) -> Result<(), BroadcastError> {
        self.manager
            .send(Publish {
                topic: self.topic.hash(),
                data,
            })
            .await
            .unwrap_or(Err(BroadcastError::NotSubscribed))
    }

    async fn next(&self) -> Option<Vec<u8>> {
        self.incoming.lock().await.recv().await
    }
}
