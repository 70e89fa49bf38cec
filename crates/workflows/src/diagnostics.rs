//! Read-only views for operators: instance listings and scheduled events.

use cplane_storage::StorageError;
use time::OffsetDateTime;

use crate::error::BackendError;
use crate::history::HistoryEvent;
use crate::kv_backend::KvBackend;
use crate::model::{Queue, WorkflowInstance, WorkflowInstanceState};
use crate::store::InstanceRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInstanceRef {
    pub instance: WorkflowInstance,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub state: WorkflowInstanceState,
    pub queue: Queue,
}

impl From<InstanceRecord> for WorkflowInstanceRef {
    fn from(r: InstanceRecord) -> Self {
        Self {
            instance: r.instance,
            created_at: r.created_at,
            completed_at: r.finished_at,
            state: r.state,
            queue: r.queue,
        }
    }
}

impl KvBackend {
    pub async fn get_workflow_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceRef, BackendError> {
        match self
            .store
            .instance
            .get_by_key(&instance.instance_id, &instance.execution_id)
            .exec()
            .await
        {
            Ok(record) => Ok(record.into()),
            Err(StorageError::NotFound { .. }) => Err(BackendError::InstanceNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// A page of executions, newest first. `after` is the last
    /// `(instance_id, execution_id)` of the previous page; an unknown cursor
    /// starts from the beginning.
    pub async fn get_workflow_instances(
        &self,
        after: Option<(&str, &str)>,
        count: usize,
    ) -> Result<Vec<WorkflowInstanceRef>, BackendError> {
        let records = self.store.instance.get_all().exec().await?;
        let start = after
            .and_then(|(instance_id, execution_id)| {
                records.iter().position(|r| {
                    r.instance.instance_id == instance_id && r.instance.execution_id == execution_id
                })
            })
            .map_or(0, |idx| idx + 1);

        Ok(records
            .into_iter()
            .skip(start)
            .take(count)
            .map(WorkflowInstanceRef::from)
            .collect())
    }

    /// Pending events for an execution that are not visible yet, soonest
    /// first.
    pub async fn get_future_events(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<Vec<HistoryEvent>, BackendError> {
        let now = OffsetDateTime::now_utc();
        let mut events: Vec<HistoryEvent> = self
            .store
            .pending_event
            .get_by_instance_execution(&instance.instance_id, &instance.execution_id)
            .exec()
            .await?
            .into_iter()
            .map(|p| p.event)
            .filter(|e| !e.is_visible(now))
            .collect();
        events.sort_by_key(|e| e.visible_at);
        Ok(events)
    }
}
