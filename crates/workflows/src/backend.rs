use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::history::{HistoryEvent, WorkflowEvent};
use crate::model::{Metadata, Queue, WorkflowInstance, WorkflowInstanceState};
use crate::options::{BackendOptions, RemovalOptions};

/// A batch of new events for one workflow execution, locked to the worker
/// that received it until completed or the lock expires.
#[derive(Debug, Clone)]
pub struct WorkflowTask {
    pub id: String,
    pub instance: WorkflowInstance,
    pub state: WorkflowInstanceState,
    pub queue: Queue,
    pub metadata: Metadata,
    /// Sequence ID of the last event already in history; zero if none.
    pub last_sequence_id: i64,
    pub new_events: Vec<HistoryEvent>,
}

/// The outcome of running a [`WorkflowTask`].
#[derive(Debug, Clone)]
pub struct WorkflowTaskCompletion {
    pub state: WorkflowInstanceState,
    /// Events applied during the task, with sequence IDs assigned. Each is
    /// appended to history and removed from the pending inbox.
    pub executed_events: Vec<HistoryEvent>,
    /// `ActivityScheduled` events to dispatch.
    pub activity_events: Vec<HistoryEvent>,
    /// Future `TimerFired` events, carrying `visible_at`.
    pub timer_events: Vec<HistoryEvent>,
    /// Events for other executions, including sub-workflow starts.
    pub workflow_events: Vec<WorkflowEvent>,
}

impl WorkflowTaskCompletion {
    pub fn new(state: WorkflowInstanceState) -> Self {
        Self {
            state,
            executed_events: Vec::new(),
            activity_events: Vec::new(),
            timer_events: Vec::new(),
            workflow_events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityTask {
    pub id: String,
    pub activity_id: String,
    pub queue: Queue,
    pub instance: WorkflowInstance,
    /// The `ActivityScheduled` event.
    pub event: HistoryEvent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub active_workflow_instances: i64,
    /// Per queue, executions that are unlocked and have a visible event.
    pub pending_workflow_tasks: BTreeMap<Queue, i64>,
    pub pending_activity_tasks: BTreeMap<Queue, i64>,
}

/// Persistence and task distribution for a workflow engine.
///
/// Every mutating call is atomic: it either applies completely or not at
/// all. Lost races for a task are reported as "no task", never as an error.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// Create a new execution and enqueue its start event. Fails with
    /// `InstanceAlreadyExists` if the instance ID has an active execution.
    async fn create_workflow_instance(
        &self,
        instance: &WorkflowInstance,
        event: HistoryEvent,
    ) -> Result<(), BackendError>;

    async fn cancel_workflow_instance(
        &self,
        instance: &WorkflowInstance,
        event: HistoryEvent,
    ) -> Result<(), BackendError>;

    /// Remove a finished execution and its history.
    async fn remove_workflow_instance(&self, instance: &WorkflowInstance) -> Result<(), BackendError>;

    async fn remove_workflow_instances(&self, options: RemovalOptions) -> Result<(), BackendError>;

    async fn get_workflow_instance_state(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceState, BackendError>;

    /// History events with a sequence ID greater than `last_sequence_id`,
    /// ascending. `None` returns the full history.
    async fn get_workflow_instance_history(
        &self,
        instance: &WorkflowInstance,
        last_sequence_id: Option<i64>,
    ) -> Result<Vec<HistoryEvent>, BackendError>;

    /// Deliver an event to the active execution of `instance_id`.
    async fn signal_workflow(&self, instance_id: &str, event: HistoryEvent) -> Result<(), BackendError>;

    async fn prepare_workflow_queues(&self, queues: &[Queue]) -> Result<(), BackendError>;

    async fn prepare_activity_queues(&self, queues: &[Queue]) -> Result<(), BackendError>;

    /// Lock and return the next workflow task from the first queue that has
    /// one. `None` when there is nothing to do.
    async fn get_workflow_task(&self, queues: &[Queue]) -> Result<Option<WorkflowTask>, BackendError>;

    async fn extend_workflow_task(&self, task: &WorkflowTask) -> Result<(), BackendError>;

    async fn complete_workflow_task(
        &self,
        task: &WorkflowTask,
        completion: WorkflowTaskCompletion,
    ) -> Result<(), BackendError>;

    async fn get_activity_task(&self, queues: &[Queue]) -> Result<Option<ActivityTask>, BackendError>;

    async fn extend_activity_task(&self, task: &ActivityTask) -> Result<(), BackendError>;

    /// Release the activity and deliver `result` to the workflow that
    /// scheduled it.
    async fn complete_activity_task(
        &self,
        task: &ActivityTask,
        result: HistoryEvent,
    ) -> Result<(), BackendError>;

    async fn get_stats(&self) -> Result<Stats, BackendError>;

    fn options(&self) -> &BackendOptions;
}
