//! Processing engine (C10): the per-node worker loop `GrabSubTask →
//! ProcessSubTask → CompleteSubTask`. Purely reactive — it never polls or
//! drives its own timers, only the completion signal fed back from its own
//! callback.

use std::sync::Arc;

use taskmesh_executor::{BlockSource, Executor, ModelInference};
use taskmesh_network_primitives::Broadcaster;
use taskmesh_primitives::hash::Hash;
use taskmesh_store::db::Database;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::subqueue::SubTaskQueue;

/// Bound to a single room's [`SubTaskQueue`]. `ProcessSubTask` (via
/// [`Executor`]) never runs inline on this loop's task — per the
/// reactor/worker-pool split, it is always dispatched to
/// `tokio::task::spawn_blocking`.
pub struct ProcessingEngine<D, B, S, M> {
    queue: Arc<SubTaskQueue<D, B>>,
    executor: Arc<Executor<S, M>>,
    initial_hash: Hash,
}

impl<D, B, S, M> ProcessingEngine<D, B, S, M>
where
    D: Database + Send + Sync + 'static,
    B: Broadcaster + Send + Sync + 'static,
    S: BlockSource + Send + Sync + 'static,
    M: ModelInference + Send + Sync + 'static,
{
    #[must_use]
    pub const fn new(queue: Arc<SubTaskQueue<D, B>>, executor: Arc<Executor<S, M>>, initial_hash: Hash) -> Self {
        Self {
            queue,
            executor,
            initial_hash,
        }
    }

    /// Runs until the room reports its subtask queue is exhausted.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.queue.is_empty().await {
                debug!("engine stopping: subtask queue exhausted");
                return;
            }

            let (done_tx, done_rx) = oneshot::channel();
            let engine = Arc::clone(&self);
            self.queue
                .grab_subtask(move |subtask| async move {
                    engine.process_and_complete(subtask).await;
                    let _ = done_tx.send(());
                })
                .await;

            // No subtask was handed out (a concurrent engine beat us to it,
            // or the queue drained between the check above and the grab);
            // the next loop iteration re-checks exhaustion.
            if done_rx.await.is_err() {
                continue;
            }
        }
    }

    async fn process_and_complete(&self, subtask: taskmesh_primitives::task::Subtask) {
        let executor = Arc::clone(&self.executor);
        let initial_hash = self.initial_hash;
        let subtask_id = subtask.subtask_id;

        let outcome = tokio::task::spawn_blocking(move || executor.process_subtask(&subtask, initial_hash)).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(subtask = %subtask_id, error = %err, "subtask execution failed, leaving lease to expire");
                return;
            }
            Err(err) => {
                warn!(subtask = %subtask_id, error = %err, "subtask execution panicked, leaving lease to expire");
                return;
            }
        };

        if let Err(err) = self.queue.complete_subtask(result).await {
            warn!(subtask = %subtask_id, error = %err, "failed to publish subtask result");
        }
    }
}
