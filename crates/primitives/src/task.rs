use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::hash::Hash;
use crate::identity::PublicKey;

/// Identifies a task across the whole fabric. Carried as the suffix of every
/// `tasks/<task_id>`-family key in the replicated store.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TaskId([u8; 32]);

impl From<[u8; 32]> for TaskId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// Identifies a subtask within its owning task.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SubTaskId([u8; 16]);

impl From<[u8; 16]> for SubTaskId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl core::fmt::Display for SubTaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// A deterministic, content-hashed slice of a subtask's input, as produced by
/// the chunk splitter (see the executor's `split` routine).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub cid: BlockId,
}

/// Submitted unit of work. Owned by the submitter until [`Enqueue`](crate) moves
/// it into the replicated store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub escrow_ref: String,
    pub subtask_count: u32,
    pub result_channel_id: String,
    pub metadata_json: String,
}

/// One unit of leasable work inside a [`Task`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subtask {
    pub subtask_id: SubTaskId,
    pub task_id: TaskId,
    pub input_cid: BlockId,
    pub chunk_list: Vec<ChunkDescriptor>,
    pub params_json: String,
}

/// The lease row at `lock_tasks/<task_id>`. The value encodes both the holder
/// and the time the lease was taken, so that concurrent `Grab` races resolve
/// to a single winner under the CRDT priority/lexicographic rule.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskLock {
    pub holder: PublicKey,
    pub lock_timestamp_ms: u64,
}

impl TaskLock {
    #[must_use]
    pub fn is_expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.lock_timestamp_ms) >= timeout_ms
    }
}

/// Result of executing a single subtask, as produced by the processing core.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubTaskResult {
    pub subtask_id: SubTaskId,
    pub result_cid: BlockId,
    pub chunk_hashes: Vec<Hash>,
    pub rolling_hash: Hash,
}

/// Aggregated result of every subtask belonging to a task, written once at
/// `Complete`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub subtask_results: Vec<SubTaskResult>,
    pub finalized_at_ms: u64,
}
