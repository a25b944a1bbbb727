//! Wire messages exchanged over the grid-wide channel (C11) and per-task
//! room channels (C9), per SPEC_FULL §6. Serialized the same way the
//! block request-response protocol is (length-prefixed JSON is handled by
//! the gossipsub transport itself; these are just the payload shapes).

use serde::{Deserialize, Serialize};
use taskmesh_primitives::identity::PublicKey;
use taskmesh_primitives::task::TaskId;

use crate::room::ProcessingRoom;

/// Exchanged on the grid-wide pubsub channel every node subscribes to on
/// startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum GridChannelMessage {
    /// "Does anyone host a room with open capacity?"
    ChannelRequest,
    /// Answered only by room hosts (SPEC_FULL §4.10 response gating).
    ChannelResponse {
        task_id: TaskId,
        capacity: u32,
        joined: u32,
    },
}

/// Exchanged on a single task's room channel (`taskmesh/room/<task_id>`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ProcessingChannelMessage {
    /// A node asking to join the room.
    RoomRequest { node_id: PublicKey },
    /// The host's current, authoritative room state.
    Room(ProcessingRoom),
    /// Broadcast by a node that just won a task's lock, to let concurrent
    /// losers of the same `Grab` race cancel their own pending room
    /// creation instead of announcing a duplicate room.
    NodeCreationIntent { peer_node_id: PublicKey, task_id: TaskId },
}
