//! Task queue (C7): `Enqueue`/`Grab`/`Complete`/`IsCompleted`, layered
//! directly on the replicated key/value store (C5). Key layout matches
//! SPEC_FULL §6 exactly so any peer reading the same namespace converges on
//! the same view regardless of which node wrote a row.

use std::sync::Arc;

use taskmesh_crdt::datastore::CrdtDatastore;
use taskmesh_primitives::identity::PublicKey;
use taskmesh_primitives::task::{SubTaskId, SubTaskResult, Subtask, Task, TaskId, TaskLock, TaskResult};
use taskmesh_store::db::Database;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("crdt store error: {0}")]
    Store(#[from] taskmesh_crdt::datastore::CrdtError),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

fn task_key(id: TaskId) -> Vec<u8> {
    format!("tasks/{id}").into_bytes()
}

fn subtask_key(task_id: TaskId, subtask_id: impl core::fmt::Display) -> Vec<u8> {
    format!("subtasks/{task_id}/{subtask_id}").into_bytes()
}

fn lock_key(id: TaskId) -> Vec<u8> {
    format!("lock_tasks/{id}").into_bytes()
}

fn result_key(id: TaskId) -> Vec<u8> {
    format!("task_results/{id}").into_bytes()
}

fn subtask_result_key(task_id: TaskId, subtask_id: SubTaskId) -> Vec<u8> {
    format!("subtask_results/{task_id}/{subtask_id}").into_bytes()
}

/// C7, layered on a `CrdtDatastore` namespace shared with every other
/// application-level row (C5's `<ns>/k/...` rows).
pub struct TaskQueue<D> {
    store: Arc<CrdtDatastore<D>>,
}

impl<D: Database> TaskQueue<D> {
    #[must_use]
    pub const fn new(store: Arc<CrdtDatastore<D>>) -> Self {
        Self { store }
    }

    /// Writes the task row and every subtask row through separate puts.
    /// Not atomic across rows — a reader mid-enqueue may see the task but
    /// not yet all its subtasks, which the subtask accessor tolerates.
    pub async fn enqueue(&self, task: &Task, subtasks: &[Subtask]) -> Result<(), QueueError> {
        self.store.put(&task_key(task.task_id), &serde_json::to_vec(task)?).await?;
        for subtask in subtasks {
            self.store
                .put(&subtask_key(task.task_id, subtask.subtask_id), &serde_json::to_vec(subtask)?)
                .await?;
        }
        Ok(())
    }

    /// Every subtask row stored for `task_id` (SPEC_FULL §4.6 `GetSubTasks` supplement).
    pub fn get_subtasks(&self, task_id: TaskId) -> Result<Vec<Subtask>, QueueError> {
        let prefix = format!("subtasks/{task_id}/").into_bytes();
        let rows = self.store.query(&prefix)?;
        rows.into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(QueueError::from))
            .collect()
    }

    /// `Grab() -> (task_id, task) | none`, per SPEC_FULL §4.6: first try an
    /// unlocked task, then fall back to migrating an expired lock. `holder`
    /// and `now_ms` identify and timestamp this node's attempt; `timeout_ms`
    /// is `processing_timeout`.
    pub async fn grab(&self, holder: PublicKey, now_ms: u64, timeout_ms: u64) -> Result<Option<(TaskId, Task)>, QueueError> {
        let tasks = self.store.query(b"tasks/")?;

        for (_, encoded_task) in &tasks {
            let task: Task = serde_json::from_slice(encoded_task)?;
            if !self.store.has(&lock_key(task.task_id))? {
                self.lease(task.task_id, holder, now_ms).await?;
                return Ok(Some((task.task_id, task)));
            }
        }

        for (_, encoded_task) in tasks {
            let task: Task = serde_json::from_slice(&encoded_task)?;
            let Some(raw_lock) = self.store.get(&lock_key(task.task_id))? else {
                continue;
            };
            let lock: TaskLock = serde_json::from_slice(&raw_lock)?;
            if lock.is_expired(now_ms, timeout_ms) {
                self.lease(task.task_id, holder, now_ms).await?;
                return Ok(Some((task.task_id, task)));
            }
        }

        Ok(None)
    }

    async fn lease(&self, task_id: TaskId, holder: PublicKey, now_ms: u64) -> Result<(), QueueError> {
        let lock = TaskLock {
            holder,
            lock_timestamp_ms: now_ms,
        };
        self.store.put(&lock_key(task_id), &serde_json::to_vec(&lock)?).await?;
        Ok(())
    }

    /// Single transaction: adds the result row, removes the lock, removes
    /// the task row.
    pub async fn complete(&self, task_id: TaskId, result: &TaskResult) -> Result<(), QueueError> {
        let mut tx = self.store.begin_transaction();
        tx.add_to_delta(&result_key(task_id), &serde_json::to_vec(result)?)?;
        tx.remove_from_delta(&lock_key(task_id))?;
        tx.remove_from_delta(&task_key(task_id))?;
        tx.publish_delta().await?;
        Ok(())
    }

    pub fn is_completed(&self, task_id: TaskId) -> Result<bool, QueueError> {
        Ok(self.store.has(&result_key(task_id))?)
    }

    /// Per-subtask completion row C8's `CompleteSubTask` writes through, so
    /// any room member can later observe that a subtask is accounted for
    /// without waiting on the room channel replay.
    pub async fn record_subtask_result(&self, task_id: TaskId, result: &SubTaskResult) -> Result<(), QueueError> {
        self.store
            .put(&subtask_result_key(task_id, result.subtask_id), &serde_json::to_vec(result)?)
            .await?;
        Ok(())
    }

    pub fn subtask_results(&self, task_id: TaskId) -> Result<Vec<SubTaskResult>, QueueError> {
        let prefix = format!("subtask_results/{task_id}/").into_bytes();
        self.store
            .query(&prefix)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(QueueError::from))
            .collect()
    }
}
