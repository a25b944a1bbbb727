//! Network layer: the swarm (C3's gossip broadcaster plus C6's Kademlia
//! provider discovery and block request-response) behind an actix actor
//! facade, the same split the teacher's network crate uses.

pub mod behaviour;
pub mod block_accessor;
pub mod client;
pub mod config;
mod manager;
pub mod messages;
pub mod protocol;

pub use block_accessor::BlockAccessor;
pub use client::{NetworkClient, TopicBroadcaster};
pub use config::NetworkConfig;
pub use manager::NetworkManager;

use actix::Actor as _;

/// Brings up the swarm and its actor, returning a client ready to
/// subscribe/publish/dial/fetch. Analogous to the teacher's
/// `NetworkManager::start`.
pub fn start(identity: libp2p_identity::Keypair, config: &NetworkConfig) -> eyre::Result<NetworkClient> {
    let swarm = behaviour::Behaviour::build_swarm(identity, config)?;
    let manager = NetworkManager::new(swarm);
    let addr = manager.start();
    Ok(NetworkClient::new(addr))
}
