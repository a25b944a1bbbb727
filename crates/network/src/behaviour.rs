//! Swarm behaviour: gossipsub (backs C3, the broadcaster) plus Kademlia and
//! the block request-response protocol (together back C6, the block
//! accessor). Transport (tcp/noise/yamux) is wired minimally — the
//! specification names "the underlying libp2p host, transport, NAT
//! traversal" as out of scope, so this does not reproduce the teacher's
//! full quic/tls/relay/autonat/dcutr/mdns/rendezvous stack.

use libp2p::swarm::NetworkBehaviour;
use libp2p::{gossipsub, kad, noise, request_response, tcp, yamux, StreamProtocol, SwarmBuilder};

use crate::config::NetworkConfig;
use crate::protocol::{BlockCodec, BLOCK_PROTOCOL};

const KAD_PROTOCOL: StreamProtocol = StreamProtocol::new("/taskmesh/kad/1.0.0");

#[expect(missing_debug_implementations, reason = "swarm behaviours don't implement Debug")]
#[derive(NetworkBehaviour)]
pub struct Behaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kad: kad::Behaviour<kad::store::MemoryStore>,
    pub blocks: request_response::Behaviour<BlockCodec>,
}

impl Behaviour {
    pub fn build_swarm(
        identity: libp2p_identity::Keypair,
        config: &NetworkConfig,
    ) -> eyre::Result<libp2p::Swarm<Self>> {
        let peer_id = identity.public().to_peer_id();

        let mut swarm = SwarmBuilder::with_existing_identity(identity)
            .with_tokio()
            .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)?
            .with_behaviour(|key| -> Result<Self, eyre::Report> {
                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub::Config::default(),
                )
                .map_err(|err| eyre::eyre!("failed to build gossipsub: {err}"))?;

                let mut kad_config = kad::Config::new(KAD_PROTOCOL);
                let _ = kad_config.set_query_timeout(core::time::Duration::from_secs(60));
                let kad = kad::Behaviour::with_config(
                    peer_id,
                    kad::store::MemoryStore::new(peer_id),
                    kad_config,
                );

                let blocks = request_response::Behaviour::new(
                    std::iter::once((BLOCK_PROTOCOL, request_response::ProtocolSupport::Full)),
                    request_response::Config::default(),
                );

                Ok(Self { gossipsub, kad, blocks })
            })?
            .build();

        for addr in &config.swarm.listen {
            swarm.listen_on(addr.clone())?;
        }

        Ok(swarm)
    }
}
