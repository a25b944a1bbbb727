//! Subtask queue accessor (C8): a single-writer-per-room view over the
//! subtask list the room host loaded from C7. `GrabSubTask` pops the next
//! subtask for a worker; `CompleteSubTask` publishes the result on the room
//! channel and writes it through C7.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use taskmesh_network_primitives::Broadcaster;
use taskmesh_primitives::task::{SubTaskResult, Subtask, TaskId};
use taskmesh_store::db::Database;
use tokio::sync::Mutex;
use tracing::debug;

use crate::queue::{QueueError, TaskQueue};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SubQueueError {
    #[error("task queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Opened by the room host once membership is settled; the same instance
/// is handed to every local [`crate::engine::ProcessingEngine`] attached to
/// the room.
pub struct SubTaskQueue<D, B> {
    task_id: TaskId,
    pending: Mutex<VecDeque<Subtask>>,
    store: Arc<TaskQueue<D>>,
    room_channel: B,
}

impl<D: Database, B: Broadcaster> SubTaskQueue<D, B> {
    #[must_use]
    pub fn new(task_id: TaskId, subtasks: Vec<Subtask>, store: Arc<TaskQueue<D>>, room_channel: B) -> Self {
        Self {
            task_id,
            pending: Mutex::new(subtasks.into()),
            store,
            room_channel,
        }
    }

    /// Pops the next subtask and invokes `on_grabbed` with it, spawned so
    /// the caller's loop is never blocked on the unit of work it just
    /// handed out. Does nothing if the local queue is already empty — the
    /// engine detects exhaustion via [`Self::is_empty`], not a callback.
    pub async fn grab_subtask<F, Fut>(&self, on_grabbed: F)
    where
        F: FnOnce(Subtask) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let next = self.pending.lock().await.pop_front();
        if let Some(subtask) = next {
            let _ = tokio::spawn(on_grabbed(subtask));
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Publishes `result` on the room channel and writes it through C7.
    pub async fn complete_subtask(&self, result: SubTaskResult) -> Result<(), SubQueueError> {
        let encoded = serde_json::to_vec(&result)?;
        self.room_channel
            .broadcast(encoded)
            .await
            .map_err(|err| SubQueueError::Publish(err.to_string()))?;
        self.store.record_subtask_result(self.task_id, &result).await?;
        debug!(subtask = %result.subtask_id, "subtask completed");
        Ok(())
    }
}
