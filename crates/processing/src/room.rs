//! Processing room (C9): per-task rendezvous, host election, and the local
//! participant state machine from SPEC_FULL §4.8.

use serde::{Deserialize, Serialize};
use taskmesh_primitives::identity::PublicKey;
use taskmesh_primitives::task::TaskId;

/// Authoritative room state, broadcast over the per-task room channel.
/// Not CRDT-replicated — reconciled by [`update_room`]'s whole-struct,
/// last-write-wins rule instead of field-by-field merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRoom {
    pub task_id: TaskId,
    pub host_node_id: PublicKey,
    pub capacity: u32,
    pub members: Vec<PublicKey>,
    pub create_timestamp_ms: u64,
    pub last_updated_at_ms: u64,
}

impl ProcessingRoom {
    #[must_use]
    pub fn new(task_id: TaskId, host_node_id: PublicKey, capacity: u32, now_ms: u64) -> Self {
        Self {
            task_id,
            host_node_id,
            capacity,
            members: vec![host_node_id],
            create_timestamp_ms: now_ms,
            last_updated_at_ms: now_ms,
        }
    }

    #[must_use]
    pub fn has_open_capacity(&self) -> bool {
        (self.members.len() as u32) < self.capacity
    }

    #[must_use]
    pub fn is_host(&self, node_id: PublicKey) -> bool {
        self.host_node_id == node_id
    }

    /// Host is also required to be the lexicographically smallest active
    /// node id (SPEC_FULL §4.8); a room whose recorded host has fallen
    /// behind a newly observed smaller id is stale by this rule even if
    /// `update_room` would otherwise keep it.
    #[must_use]
    pub fn smallest_member(&self) -> Option<PublicKey> {
        self.members.iter().copied().min()
    }

    fn admit(&mut self, node_id: PublicKey, now_ms: u64) {
        if !self.members.contains(&node_id) {
            self.members.push(node_id);
            self.last_updated_at_ms = now_ms;
        }
    }
}

/// `UpdateRoom`: an incoming broadcast replaces `current` only if it is
/// newer by `(create_timestamp_ms, last_updated_at_ms)`, compared in that
/// order. Returns `true` when `incoming` should become the new local state.
#[must_use]
pub fn update_room(current: Option<&ProcessingRoom>, incoming: &ProcessingRoom) -> bool {
    match current {
        None => true,
        Some(current) => {
            (incoming.create_timestamp_ms, incoming.last_updated_at_ms)
                > (current.create_timestamp_ms, current.last_updated_at_ms)
        }
    }
}

/// This node's role once `ATTACHED`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Host,
    Member,
}

/// Local participant state machine, one instance per task this node is
/// tracking.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoomState {
    Outside,
    PendingCreate { deadline_ms: u64 },
    Joining { deadline_ms: u64 },
    Attached(Role),
}

/// Drives one task's [`RoomState`] through the transitions in SPEC_FULL
/// §4.8's diagram.
pub struct RoomParticipant {
    node_id: PublicKey,
    state: RoomState,
    room: Option<ProcessingRoom>,
}

impl RoomParticipant {
    #[must_use]
    pub const fn new(node_id: PublicKey) -> Self {
        Self {
            node_id,
            state: RoomState::Outside,
            room: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &RoomState {
        &self.state
    }

    #[must_use]
    pub const fn room(&self) -> Option<&ProcessingRoom> {
        self.room.as_ref()
    }

    /// `OUTSIDE --(task observed + lock acquired)--> PENDING_CREATE`. The
    /// caller has just won `Grab`; this materializes the room this node
    /// intends to host unless a competing announcement arrives first.
    pub fn on_lock_acquired(&mut self, task_id: TaskId, capacity: u32, now_ms: u64, node_creation_timeout_ms: u64) {
        if !matches!(self.state, RoomState::Outside) {
            return;
        }
        self.room = Some(ProcessingRoom::new(task_id, self.node_id, capacity, now_ms));
        self.state = RoomState::PendingCreate {
            deadline_ms: now_ms + node_creation_timeout_ms,
        };
    }

    /// `OUTSIDE --(room announcement observed)--> JOINING` and
    /// `PENDING_CREATE --(competing announcement)--> JOINING`. Also applies
    /// [`update_room`] reconciliation while already `ATTACHED`.
    pub fn on_room_announcement(&mut self, announced: ProcessingRoom, now_ms: u64, room_attachment_timeout_ms: u64) {
        match &self.state {
            RoomState::Outside => {
                self.room = Some(announced);
                self.state = RoomState::Joining {
                    deadline_ms: now_ms + room_attachment_timeout_ms,
                };
            }
            RoomState::PendingCreate { .. } => {
                if announced.task_id == self.room.as_ref().map(|r| r.task_id).unwrap_or(announced.task_id) {
                    self.room = Some(announced);
                    self.state = RoomState::Joining {
                        deadline_ms: now_ms + room_attachment_timeout_ms,
                    };
                }
            }
            RoomState::Joining { deadline_ms } => {
                if update_room(self.room.as_ref(), &announced) {
                    let deadline_ms = *deadline_ms;
                    self.room = Some(announced);
                    self.state = RoomState::Joining { deadline_ms };
                }
            }
            RoomState::Attached(_) => {
                if update_room(self.room.as_ref(), &announced) {
                    self.room = Some(announced);
                }
            }
        }
    }

    /// `PENDING_CREATE --(timeout elapsed)--> ATTACHED(host)` and
    /// `JOINING --(timeout)--> OUTSIDE`. No-op outside those two states or
    /// before `now_ms` reaches the recorded deadline.
    pub fn on_timeout(&mut self, now_ms: u64) {
        match self.state {
            RoomState::PendingCreate { deadline_ms } if now_ms >= deadline_ms => {
                self.state = RoomState::Attached(Role::Host);
            }
            RoomState::Joining { deadline_ms } if now_ms >= deadline_ms => {
                self.state = RoomState::Outside;
                self.room = None;
            }
            _ => {}
        }
    }

    /// `JOINING --(member list accepts node)--> ATTACHED(member)`.
    pub fn on_membership_accepted(&mut self, room: ProcessingRoom, now_ms: u64) {
        if matches!(self.state, RoomState::Joining { .. }) && room.members.contains(&self.node_id) {
            self.room = Some(room);
            self.state = RoomState::Attached(Role::Member);
        } else if matches!(self.state, RoomState::Joining { .. }) {
            let mut room = room;
            room.admit(self.node_id, now_ms);
            self.room = Some(room);
        }
    }

    /// `ATTACHED --(queue complete | task removed)--> OUTSIDE`.
    pub fn on_task_finished(&mut self) {
        if matches!(self.state, RoomState::Attached(_)) {
            self.state = RoomState::Outside;
            self.room = None;
        }
    }
}
