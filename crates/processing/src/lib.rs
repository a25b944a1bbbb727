//! Task/subtask queue (C7/C8), processing room election (C9), the
//! per-node worker loop (C10), and the top-level supervisor (C11) that ties
//! them to the replicated store (C5) and the gossip overlay (C3).

pub mod config;
pub mod engine;
pub mod messages;
pub mod queue;
pub mod room;
pub mod service;
pub mod subqueue;

pub use config::ProcessingConfig;
pub use engine::ProcessingEngine;
pub use queue::{QueueError, TaskQueue};
pub use room::{ProcessingRoom, Role, RoomParticipant, RoomState};
pub use service::ProcessingService;
pub use subqueue::{SubQueueError, SubTaskQueue};
