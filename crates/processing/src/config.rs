//! Processing-layer tunables (SPEC_FULL §6 / §10.3). `block_request_timeout`
//! lives with the block accessor in `taskmesh-network` instead — it bounds
//! C6, not this crate.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound on engines a single process runs concurrently.
    pub maximal_nodes_count: u32,
    /// Member cap per room (C9).
    pub processing_room_capacity: u32,
    /// How long C11 waits for channel-list responses before giving up and
    /// attempting to `Grab` and host a room itself.
    pub channel_list_request_timeout_ms: u64,
    /// Lifetime of a room's `PENDING_CREATE` intent before it self-promotes
    /// to host (default 10 s per spec).
    pub node_creation_timeout_ms: u64,
    /// Task lock validity; also the `JOINING` attach timeout used by C9.
    pub processing_timeout_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            maximal_nodes_count: 4,
            processing_room_capacity: 8,
            channel_list_request_timeout_ms: 5_000,
            node_creation_timeout_ms: 10_000,
            processing_timeout_ms: 10_000,
        }
    }
}
