//! Processing service (C11): top-level supervisor. Subscribes to the
//! grid-wide channel, advertises/discovers rooms, and owns up to
//! `maximal_nodes_count` engines.

use std::sync::Arc;
use std::time::Duration;

use taskmesh_crdt::datastore::CrdtDatastore;
use taskmesh_executor::{BlockSource, Executor, ModelInference};
use taskmesh_network_primitives::Broadcaster;
use taskmesh_primitives::hash::Hash;
use taskmesh_primitives::identity::PublicKey;
use taskmesh_store::db::Database;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::engine::ProcessingEngine;
use crate::messages::{GridChannelMessage, ProcessingChannelMessage};
use crate::queue::TaskQueue;
use crate::room::{Role, RoomParticipant, RoomState};
use crate::subqueue::SubTaskQueue;

/// Binds a running [`ProcessingEngine`] (as a join handle) to the room it
/// was created for, so shutdown can stop engines in reverse-creation order.
struct RunningEngine {
    task_id: taskmesh_primitives::task::TaskId,
    handle: tokio::task::JoinHandle<()>,
}

/// Top-level supervisor (C11). Generic over the grid channel's broadcaster
/// type as well as the per-room broadcaster, since both are realized by the
/// same gossipsub-backed [`taskmesh_network::client::TopicBroadcaster`] in
/// practice but are kept decoupled here for testability.
pub struct ProcessingService<D, G, S, M> {
    node_id: PublicKey,
    config: ProcessingConfig,
    store: Arc<TaskQueue<D>>,
    grid_channel: G,
    blocks: Arc<S>,
    model: Arc<M>,
    engines: Mutex<Vec<RunningEngine>>,
}

impl<D, G, S, M> ProcessingService<D, G, S, M>
where
    D: Database + 'static,
    G: Broadcaster,
    S: BlockSource + Send + Sync + 'static,
    M: ModelInference + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        node_id: PublicKey,
        config: ProcessingConfig,
        crdt_store: Arc<CrdtDatastore<D>>,
        grid_channel: G,
        blocks: Arc<S>,
        model: Arc<M>,
    ) -> Self {
        Self {
            node_id,
            config,
            store: Arc::new(TaskQueue::new(crdt_store)),
            grid_channel,
            blocks,
            model,
            engines: Mutex::new(Vec::new()),
        }
    }

    /// One pass of C11's core decision loop: publish a channel-list
    /// request, wait up to `channel_list_request_timeout_ms` for a
    /// response advertising open capacity, and either join that room or
    /// attempt to `Grab` and host a new one. Intended to be called
    /// repeatedly by an embedder-owned scheduling loop (this crate does not
    /// drive its own timer, matching C10's reactive posture).
    pub async fn discover_or_create<B>(&self, room_channel: impl FnOnce(taskmesh_primitives::task::TaskId) -> B, now_ms: u64) -> eyre::Result<()>
    where
        B: Broadcaster + Send + Sync + 'static,
    {
        if (self.engines.lock().await.len() as u32) >= self.config.maximal_nodes_count {
            debug!("at maximal_nodes_count, skipping discovery pass");
            return Ok(());
        }

        let request = serde_json::to_vec(&GridChannelMessage::ChannelRequest)?;
        self.grid_channel
            .broadcast(request)
            .await
            .map_err(|err| eyre::eyre!("failed to publish channel-list request: {err}"))?;

        let deadline = Instant::now() + Duration::from_millis(self.config.channel_list_request_timeout_ms);
        let mut joinable = None;
        while Instant::now() < deadline {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            let Ok(Some(raw)) = tokio::time::timeout(remaining, self.grid_channel.next()).await else {
                break;
            };
            if let Ok(GridChannelMessage::ChannelResponse { task_id, capacity, joined }) = serde_json::from_slice(&raw) {
                if joined < capacity {
                    joinable = Some(task_id);
                    break;
                }
            }
        }

        if let Some(task_id) = joinable {
            info!(task = %task_id, "joining advertised room");
            return self.join_room(task_id, room_channel(task_id), now_ms).await;
        }

        let Some((task_id, _task)) = self.store.grab(self.node_id, now_ms, self.config.processing_timeout_ms).await? else {
            debug!("no joinable room found and nothing to grab");
            return Ok(());
        };

        info!(task = %task_id, "grabbed task, hosting new room");
        self.host_room(task_id, room_channel(task_id), now_ms).await
    }

    async fn host_room<B>(&self, task_id: taskmesh_primitives::task::TaskId, room_channel: B, now_ms: u64) -> eyre::Result<()>
    where
        B: Broadcaster + Send + Sync + 'static,
    {
        let mut participant = RoomParticipant::new(self.node_id);
        participant.on_lock_acquired(task_id, self.config.processing_room_capacity, now_ms, self.config.node_creation_timeout_ms);

        let intent = serde_json::to_vec(&ProcessingChannelMessage::NodeCreationIntent {
            peer_node_id: self.node_id,
            task_id,
        })?;
        room_channel.broadcast(intent).await.map_err(|err| eyre::eyre!("failed to publish node-creation intent: {err}"))?;

        // Give any concurrent winner of the same race a chance to announce
        // first; a competing announcement flips us PENDING_CREATE -> JOINING.
        let deadline = Instant::now() + Duration::from_millis(self.config.node_creation_timeout_ms);
        while matches!(participant.state(), RoomState::PendingCreate { .. }) {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            match tokio::time::timeout(remaining, room_channel.next()).await {
                Ok(Some(raw)) => {
                    if let Ok(ProcessingChannelMessage::Room(announced)) = serde_json::from_slice(&raw) {
                        if announced.task_id == task_id {
                            participant.on_room_announcement(announced, now_ms, self.config.processing_timeout_ms);
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        participant.on_timeout(now_ms + self.config.node_creation_timeout_ms);

        match participant.state() {
            RoomState::Attached(Role::Host) => {
                let room = participant.room().cloned().expect("attached host always carries its room");
                let announce = serde_json::to_vec(&ProcessingChannelMessage::Room(room))?;
                room_channel
                    .broadcast(announce)
                    .await
                    .map_err(|err| eyre::eyre!("failed to announce room: {err}"))?;
                self.spawn_engine(task_id, room_channel).await
            }
            RoomState::Joining { .. } => {
                info!(task = %task_id, "deferring to a concurrent room announcement");
                self.join_room(task_id, room_channel, now_ms).await
            }
            _ => {
                warn!(task = %task_id, "room creation was pre-empted before it could attach");
                Ok(())
            }
        }
    }

    async fn join_room<B>(&self, task_id: taskmesh_primitives::task::TaskId, room_channel: B, _now_ms: u64) -> eyre::Result<()>
    where
        B: Broadcaster + Send + Sync + 'static,
    {
        let request = serde_json::to_vec(&ProcessingChannelMessage::RoomRequest { node_id: self.node_id })?;
        room_channel
            .broadcast(request)
            .await
            .map_err(|err| eyre::eyre!("failed to publish room join request: {err}"))?;

        self.spawn_engine(task_id, room_channel).await
    }

    async fn spawn_engine<B>(&self, task_id: taskmesh_primitives::task::TaskId, room_channel: B) -> eyre::Result<()>
    where
        B: Broadcaster + Send + Sync + 'static,
    {
        let subtasks = self.store.get_subtasks(task_id)?;
        let sub_queue = Arc::new(SubTaskQueue::new(task_id, subtasks, Arc::clone(&self.store), room_channel));

        let executor = Arc::new(Executor::new(
            ClonedBlockSource(Arc::clone(&self.blocks)),
            ClonedModel(Arc::clone(&self.model)),
            taskmesh_executor::ValidationHashes::new(),
        ));
        let seed = Hash::new(&self.node_id[..]);
        let engine = Arc::new(ProcessingEngine::new(sub_queue, executor, seed));

        let handle = tokio::spawn(async move { engine.run().await });
        self.engines.lock().await.push(RunningEngine { task_id, handle });
        Ok(())
    }

    /// Stops engines in reverse-creation order and waits up to `grace` for
    /// each to drain its inflight `CompleteSubTask` publication.
    pub async fn shutdown(&self, grace: Duration) {
        let mut engines = self.engines.lock().await;
        while let Some(running) = engines.pop() {
            let task_id = running.task_id;
            if tokio::time::timeout(grace, running.handle).await.is_err() {
                warn!(task = %task_id, "engine did not drain within the shutdown grace period");
            }
        }
    }
}

/// `BlockSource`/`ModelInference` require `&self` access but the service
/// hands every engine an owned `Arc`; these thin wrappers let an `Arc<S>`
/// stand in for `S` without requiring `S` itself to be `Clone`.
struct ClonedBlockSource<S>(Arc<S>);

impl<S: BlockSource> BlockSource for ClonedBlockSource<S> {
    fn load(&self, id: &taskmesh_primitives::block::BlockId) -> Result<Vec<u8>, taskmesh_executor::ExecutionError> {
        self.0.load(id)
    }

    fn store(&self, bytes: &[u8]) -> Result<taskmesh_primitives::block::BlockId, taskmesh_executor::ExecutionError> {
        self.0.store(bytes)
    }
}

struct ClonedModel<M>(Arc<M>);

impl<M: ModelInference> ModelInference for ClonedModel<M> {
    fn infer(&self, chunk: &[u8]) -> Result<Vec<u8>, taskmesh_executor::InferenceError> {
        self.0.infer(chunk)
    }
}
