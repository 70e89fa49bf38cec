//! Blocking task polls.
//!
//! A poll that finds nothing waits for a store event that could make a task
//! available, or for `poll_interval`, whichever comes first. Lock expiry is
//! not watched, so the interval also bounds how long an expired task waits.

use cplane_storage::{StorageError, Subscription, Value, WatchOp};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{ActivityTask, WorkflowBackend, WorkflowTask};
use crate::error::BackendError;
use crate::kv_backend::KvBackend;
use crate::model::Queue;

impl KvBackend {
    /// Returns `None` only when `token` is cancelled.
    pub async fn wait_for_workflow_task(
        &self,
        queues: &[Queue],
        token: &CancellationToken,
    ) -> Result<Option<WorkflowTask>, BackendError> {
        let op = self.store.pending_event.watch_all();
        let mut sub = op.subscribe().await?;
        loop {
            if let Some(task) = self.get_workflow_task(queues).await? {
                return Ok(Some(task));
            }
            if !self.idle(&op, &mut sub, token).await? {
                return Ok(None);
            }
        }
    }

    /// Returns `None` only when `token` is cancelled.
    pub async fn wait_for_activity_task(
        &self,
        queues: &[Queue],
        token: &CancellationToken,
    ) -> Result<Option<ActivityTask>, BackendError> {
        let op = self.store.activity_queue_item.watch_all();
        let mut sub = op.subscribe().await?;
        loop {
            if let Some(task) = self.get_activity_task(queues).await? {
                return Ok(Some(task));
            }
            if !self.idle(&op, &mut sub, token).await? {
                return Ok(None);
            }
        }
    }

    /// Wait for the next change, the poll interval, or cancellation. Returns
    /// false when cancelled.
    async fn idle<V: Value>(
        &self,
        op: &WatchOp<V>,
        sub: &mut Subscription<V>,
        token: &CancellationToken,
    ) -> Result<bool, BackendError> {
        let woke = tokio::select! {
            _ = token.cancelled() => return Ok(false),
            ev = tokio::time::timeout(self.options.poll_interval, sub.next()) => ev,
        };
        let closed = match woke {
            Ok(None) => true,
            Ok(Some(ev)) => matches!(ev.err, Some(StorageError::WatchClosed)),
            Err(_) => false,
        };
        if closed {
            debug!("task watch closed, resubscribing");
            *sub = op.subscribe().await?;
        }
        Ok(true)
    }
}
