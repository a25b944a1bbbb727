//! Actix command messages `NetworkClient` sends to `NetworkManager`, one
//! struct per verb, the same split the teacher's `handler/command/*.rs`
//! files use. Each `Handler` impl just forwards to the swarm driver over
//! its command channel and relays the driver's oneshot reply back through
//! actix's `ResponseFuture`.

use actix::{Handler, Message, ResponseFuture};
use libp2p::gossipsub::{IdentTopic, TopicHash};
use libp2p::{Multiaddr, PeerId};
use taskmesh_network_primitives::{BroadcastError, DiscoveryError, RequestError};
use taskmesh_primitives::block::BlockId;
use tokio::sync::{mpsc, oneshot};

use crate::manager::{Command, NetworkManager};

pub struct Dial(pub Multiaddr);

impl Message for Dial {
    type Result = eyre::Result<()>;
}

impl Handler<Dial> for NetworkManager {
    type Result = ResponseFuture<eyre::Result<()>>;

    fn handle(&mut self, msg: Dial, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move { run(&commands, |tx| Command::Dial(msg.0, tx)).await? })
    }
}

/// Subscribes to `topic` and hands back the raw receiving half; callers
/// wrap this in a `Broadcaster` (see `crate::client::TopicBroadcaster`).
pub struct Subscribe(pub IdentTopic);

impl Message for Subscribe {
    type Result = eyre::Result<mpsc::UnboundedReceiver<Vec<u8>>>;
}

impl Handler<Subscribe> for NetworkManager {
    type Result = ResponseFuture<eyre::Result<mpsc::UnboundedReceiver<Vec<u8>>>>;

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            run(&commands, |outcome| Command::Subscribe(msg.0, tx, outcome)).await??;
            Ok(rx)
        })
    }
}

pub struct Unsubscribe(pub IdentTopic);

impl Message for Unsubscribe {
    type Result = ();
}

impl Handler<Unsubscribe> for NetworkManager {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Self::Context) -> Self::Result {
        let _ = self.commands().send(Command::Unsubscribe(msg.0));
    }
}

pub struct Publish {
    pub topic: TopicHash,
    pub data: Vec<u8>,
}

impl Message for Publish {
    type Result = Result<(), BroadcastError>;
}

impl Handler<Publish> for NetworkManager {
    type Result = ResponseFuture<Result<(), BroadcastError>>;

    fn handle(&mut self, msg: Publish, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            match run(&commands, |tx| Command::Publish(msg.topic, msg.data, tx)).await {
                Ok(inner) => inner,
                Err(_) => Err(BroadcastError::NotSubscribed),
            }
        })
    }
}

pub struct PeerCount;

impl Message for PeerCount {
    type Result = usize;
}

impl Handler<PeerCount> for NetworkManager {
    type Result = ResponseFuture<usize>;

    fn handle(&mut self, _msg: PeerCount, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move { run(&commands, Command::PeerCount).await.unwrap_or(0) })
    }
}

pub struct MeshPeerCount(pub TopicHash);

impl Message for MeshPeerCount {
    type Result = usize;
}

impl Handler<MeshPeerCount> for NetworkManager {
    type Result = ResponseFuture<usize>;

    fn handle(&mut self, msg: MeshPeerCount, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            run(&commands, |tx| Command::MeshPeerCount(msg.0, tx)).await.unwrap_or(0)
        })
    }
}

pub struct MeshPeers(pub TopicHash);

impl Message for MeshPeers {
    type Result = Vec<PeerId>;
}

impl Handler<MeshPeers> for NetworkManager {
    type Result = ResponseFuture<Vec<PeerId>>;

    fn handle(&mut self, msg: MeshPeers, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            run(&commands, |tx| Command::MeshPeers(msg.0, tx)).await.unwrap_or_default()
        })
    }
}

pub struct QueryProviders(pub BlockId);

impl Message for QueryProviders {
    type Result = Result<Vec<PeerId>, DiscoveryError>;
}

impl Handler<QueryProviders> for NetworkManager {
    type Result = ResponseFuture<Result<Vec<PeerId>, DiscoveryError>>;

    fn handle(&mut self, msg: QueryProviders, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            match run(&commands, |tx| Command::FindProviders(msg.0, tx)).await {
                Ok(inner) => inner,
                Err(_) => Err(DiscoveryError::Query("network manager shut down".to_owned())),
            }
        })
    }
}

pub struct AnnounceProvider(pub BlockId);

impl Message for AnnounceProvider {
    type Result = Result<(), DiscoveryError>;
}

impl Handler<AnnounceProvider> for NetworkManager {
    type Result = ResponseFuture<Result<(), DiscoveryError>>;

    fn handle(&mut self, msg: AnnounceProvider, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            match run(&commands, |tx| Command::Announce(msg.0, tx)).await {
                Ok(inner) => inner,
                Err(_) => Err(DiscoveryError::Query("network manager shut down".to_owned())),
            }
        })
    }
}

pub struct RequestBlockFrom {
    pub peer: PeerId,
    pub id: BlockId,
}

impl Message for RequestBlockFrom {
    type Result = Result<Option<Vec<u8>>, RequestError>;
}

impl Handler<RequestBlockFrom> for NetworkManager {
    type Result = ResponseFuture<Result<Option<Vec<u8>>, RequestError>>;

    fn handle(&mut self, msg: RequestBlockFrom, _ctx: &mut Self::Context) -> Self::Result {
        let commands = self.commands();
        Box::pin(async move {
            match run(&commands, |tx| Command::RequestBlock(msg.peer, msg.id, tx)).await {
                Ok(inner) => inner,
                Err(_) => Err(RequestError::Other("network manager shut down".to_owned())),
            }
        })
    }
}

async fn run<T>(
    commands: &mpsc::UnboundedSender<Command>,
    build: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> eyre::Result<T> {
    let (tx, rx) = oneshot::channel();
    commands
        .send(build(tx))
        .map_err(|_| eyre::eyre!("swarm driver task has stopped"))?;
    rx.await.map_err(|_| eyre::eyre!("swarm driver dropped the response channel"))
}
