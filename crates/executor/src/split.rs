//! Deterministic chunk split, generalized from the original's row/column
//! image striding (`processing_imagesplit.cpp`) into a single
//! bytes-per-chunk stride. The row/column addressing itself is domain
//! specific to image tensors and out of scope; the chunk-at-a-time split is
//! not.

use serde::{Deserialize, Serialize};

/// Parsed from a [`taskmesh_primitives::task::Subtask::params_json`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SplitParams {
    pub chunk_stride: u32,
}

/// Splits `bytes` into `ceil(len / chunk_stride)` chunks of `chunk_stride`
/// bytes each; the final chunk may be short. Pure and order-preserving, so
/// two peers given the same bytes and stride always agree on chunk
/// boundaries and indices.
#[must_use]
pub fn split(bytes: &[u8], chunk_stride: u32) -> Vec<&[u8]> {
    if chunk_stride == 0 || bytes.is_empty() {
        return Vec::new();
    }
    bytes.chunks(chunk_stride as usize).collect()
}
