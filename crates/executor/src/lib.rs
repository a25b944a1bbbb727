//! Processing core / executor (C12): the deterministic per-subtask
//! execution contract, `ProcessSubTask(subtask, initial_hash) -> SubTaskResult`.
//! Everything network- or storage-adjacent (fetching `input_cid`, leasing
//! the subtask, publishing the result) belongs to the engine (C10) that
//! drives this trait; this crate owns only the split/hash scaffolding and
//! the inference trait boundary around it.
//!
//! `ProcessSubTask` must never run on the reactor thread — callers are
//! expected to invoke it via a bounded worker pool (`tokio::task::spawn_blocking`
//! in the processing engine).

pub mod split;

use std::collections::HashMap;

use taskmesh_primitives::block::{BlockId, Codec};
use taskmesh_primitives::hash::Hash;
use taskmesh_primitives::task::{SubTaskId, Subtask, SubTaskResult};
use thiserror::Error;

use crate::split::SplitParams;

/// The out-of-scope "MNN/GPU inference library" boundary named in the
/// specification: given one chunk's raw bytes, produce the processed
/// tensor bytes this node will hash into its slot in the rolling digest.
pub trait ModelInference: Send + Sync {
    fn infer(&self, chunk: &[u8]) -> Result<Vec<u8>, InferenceError>;
}

#[derive(Debug, Error)]
#[error("model inference failed: {0}")]
pub struct InferenceError(pub String);

/// Local block access the executor needs: read a subtask's input, and
/// persist the aggregated processed output under a fresh content id. By
/// the time `ProcessSubTask` runs, C2/C6 have already guaranteed the input
/// is present locally — this trait never reaches onto the network.
pub trait BlockSource: Send + Sync {
    fn load(&self, id: &BlockId) -> Result<Vec<u8>, ExecutionError>;
    fn store(&self, bytes: &[u8]) -> Result<BlockId, ExecutionError>;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    #[error("invalid subtask params: {0}")]
    InvalidParams(#[from] serde_json::Error),
    #[error("chunk {index} failed: {reason}")]
    ChunkFailed { index: u32, reason: String },
    #[error("block store error: {0}")]
    Store(String),
}

/// Well-known subtask id the engine assigns to the validation pass that
/// runs alongside real work; `process_subtask` recognizes it and reuses
/// `validation_hashes` instead of invoking the model.
#[must_use]
pub fn validation_subtask_id() -> SubTaskId {
    SubTaskId::from([0xFF; 16])
}

/// Preconfigured expected chunk hashes for the validation subtask, indexed
/// by chunk index, supplied out of band (not derived from `infer`).
pub type ValidationHashes = HashMap<u32, Hash>;

/// Executes subtasks against a fixed model and local block store.
pub struct Executor<B, M> {
    blocks: B,
    model: M,
    validation_hashes: ValidationHashes,
}

impl<B: BlockSource, M: ModelInference> Executor<B, M> {
    pub const fn new(blocks: B, model: M, validation_hashes: ValidationHashes) -> Self {
        Self {
            blocks,
            model,
            validation_hashes,
        }
    }

    /// `ProcessSubTask(subtask, initial_hash) -> SubTaskResult`.
    ///
    /// Splits `subtask.input_cid`'s bytes by `chunk_stride`, runs each chunk
    /// named in `subtask.chunk_list` through `ModelInference` in ascending
    /// index order, and folds the per-chunk hashes into a rolling digest
    /// seeded by `initial_hash`. The validation subtask (see
    /// [`validation_subtask_id`]) substitutes preconfigured hashes instead
    /// of invoking the model, so its rolling hash detects a peer that
    /// silently diverges from the agreed-upon chunk hashes.
    pub fn process_subtask(&self, subtask: &Subtask, initial_hash: Hash) -> Result<SubTaskResult, ExecutionError> {
        let params: SplitParams = serde_json::from_str(&subtask.params_json)?;
        let input = self.blocks.load(&subtask.input_cid)?;
        let chunks = split::split(&input, params.chunk_stride);

        let is_validation = subtask.subtask_id == validation_subtask_id();

        let mut ordered = subtask.chunk_list.clone();
        ordered.sort_by_key(|descriptor| descriptor.index);

        let mut rolling = initial_hash;
        let mut chunk_hashes = Vec::with_capacity(ordered.len());
        let mut outputs: Vec<Vec<u8>> = Vec::with_capacity(ordered.len());

        for descriptor in &ordered {
            let chunk_hash = if is_validation {
                *self.validation_hashes.get(&descriptor.index).ok_or_else(|| ExecutionError::ChunkFailed {
                    index: descriptor.index,
                    reason: "no preconfigured validation hash for this chunk index".to_owned(),
                })?
            } else {
                let chunk = chunks.get(descriptor.index as usize).ok_or_else(|| ExecutionError::ChunkFailed {
                    index: descriptor.index,
                    reason: "chunk index out of range for the split input".to_owned(),
                })?;
                let processed = self.model.infer(chunk).map_err(|err| {
                    tracing::warn!(index = descriptor.index, subtask = %subtask.subtask_id, "chunk inference failed");
                    ExecutionError::ChunkFailed {
                        index: descriptor.index,
                        reason: err.0,
                    }
                })?;
                let hash = Hash::new(&processed);
                outputs.push(processed);
                hash
            };

            rolling = fold(rolling, chunk_hash);
            chunk_hashes.push(chunk_hash);
        }

        let result_cid = self.blocks.store(&encode_outputs(&outputs))?;

        Ok(SubTaskResult {
            subtask_id: subtask.subtask_id,
            result_cid,
            chunk_hashes,
            rolling_hash: rolling,
        })
    }
}

/// `rolling_{i+1} = H(rolling_i || chunk_hash_i)`.
fn fold(rolling: Hash, chunk_hash: Hash) -> Hash {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(rolling.as_bytes());
    buf.extend_from_slice(chunk_hash.as_bytes());
    Hash::new(&buf)
}

fn encode_outputs(outputs: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    for output in outputs {
        #[allow(clippy::cast_possible_truncation, reason = "chunk outputs stay well under u32::MAX")]
        buf.extend_from_slice(&(output.len() as u32).to_be_bytes());
        buf.extend_from_slice(output);
    }
    buf
}

/// Tags executor-produced blocks distinctly from DAG nodes (C1's `Codec::DagNode`).
#[must_use]
pub fn result_codec() -> Codec {
    Codec::Raw
}
