//! [`WorkflowBackend`] on the versioned store.
//!
//! Every mutation is a single store transaction. Task claims are guarded by
//! rewriting the queue item, so concurrent pollers race on its version and
//! the loser simply moves on to the next item.

use std::collections::HashSet;

use async_trait::async_trait;
use cplane_storage::StorageError;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::backend::{ActivityTask, Stats, WorkflowBackend, WorkflowTask, WorkflowTaskCompletion};
use crate::error::BackendError;
use crate::history::{events_by_workflow_instance, EventAttributes, EventType, HistoryEvent};
use crate::model::{Metadata, Queue, WorkflowInstance, WorkflowInstanceState};
use crate::options::{BackendOptions, RemovalOptions};
use crate::store::{
    ActivityLock, ActivityQueueItem, HistoryRecord, InstanceRecord, PendingEvent, Store,
    WorkflowInstanceLock, WorkflowInstanceSticky, WorkflowQueueItem,
};
use crate::worker::WorkerIdentity;

pub struct KvBackend {
    pub(crate) store: Store,
    pub(crate) options: BackendOptions,
    pub(crate) identity: WorkerIdentity,
}

impl KvBackend {
    /// A backend for one worker process. `worker_id` should survive
    /// restarts; a fresh process instance ID is generated here.
    pub fn new(store: Store, options: BackendOptions, worker_id: impl Into<String>) -> Self {
        Self::with_identity(store, options, WorkerIdentity::new(worker_id))
    }

    pub fn with_identity(store: Store, options: BackendOptions, identity: WorkerIdentity) -> Self {
        Self {
            store,
            options,
            identity,
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The workflow lock held by this process. A lock that expired without
    /// being taken by anyone else is returned unsaved, so writing or
    /// deleting it still requires the key to be absent.
    async fn owned_workflow_lock(
        &self,
        instance_id: &str,
        execution_id: &str,
    ) -> Result<WorkflowInstanceLock, BackendError> {
        match self
            .store
            .instance_lock
            .get_by_key(instance_id, execution_id)
            .exec()
            .await
        {
            Ok(lock) if lock.is_held_by(&self.identity) => Ok(lock),
            Ok(lock) => {
                debug!(
                    %instance_id,
                    holder = %lock.worker_instance_id,
                    "workflow task lock held by another worker"
                );
                Err(BackendError::LockLost)
            }
            Err(StorageError::NotFound { .. }) => Ok(WorkflowInstanceLock::new(
                instance_id,
                execution_id,
                &self.identity,
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn owned_activity_lock(
        &self,
        instance_id: &str,
        event_id: &str,
    ) -> Result<ActivityLock, BackendError> {
        match self.store.activity_lock.get_by_key(instance_id, event_id).exec().await {
            Ok(lock) if lock.is_held_by(&self.identity) => Ok(lock),
            Ok(lock) => {
                debug!(
                    %instance_id,
                    %event_id,
                    holder = %lock.worker_instance_id,
                    "activity lock held by another worker"
                );
                Err(BackendError::LockLost)
            }
            Err(StorageError::NotFound { .. }) => {
                Ok(ActivityLock::new(instance_id, event_id, &self.identity))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn not_found_as(err: StorageError, mapped: BackendError) -> BackendError {
    match err {
        StorageError::NotFound { .. } => mapped,
        e => e.into(),
    }
}

/// Oldest first. Ties keep store order.
pub(crate) fn sort_pending_events(events: &mut [PendingEvent]) {
    events.sort_by_key(|p| p.event.timestamp);
}

fn started_queue_and_metadata(event: &HistoryEvent, fallback: &Queue) -> (Queue, Metadata) {
    match &event.attributes {
        EventAttributes::ExecutionStarted {
            queue, metadata, ..
        } => (
            queue.clone().unwrap_or_else(|| fallback.clone()),
            metadata.clone(),
        ),
        _ => (fallback.clone(), Metadata::new()),
    }
}

#[async_trait]
impl WorkflowBackend for KvBackend {
    async fn create_workflow_instance(
        &self,
        instance: &WorkflowInstance,
        event: HistoryEvent,
    ) -> Result<(), BackendError> {
        let executions = self
            .store
            .instance
            .get_by_instance_id(&instance.instance_id)
            .exec()
            .await?;
        if executions.iter().any(|e| e.state.is_active()) {
            return Err(BackendError::InstanceAlreadyExists);
        }

        let (queue, metadata) = started_queue_and_metadata(&event, &Queue::default());
        let mut txn = self.store.txn();
        txn.add(self.store.instance.create(InstanceRecord::active(
            instance.clone(),
            queue.clone(),
            metadata.clone(),
        )))
        .add(self.store.pending_event.put(PendingEvent::new(
            &instance.instance_id,
            &instance.execution_id,
            event,
        )))
        .add(
            self.store
                .workflow_queue_item
                .put(WorkflowQueueItem::new(instance.clone(), queue.clone(), metadata)),
        );
        match txn.commit().await {
            Ok(()) => {
                debug!(instance_id = %instance.instance_id, %queue, "created workflow instance");
                Ok(())
            }
            Err(StorageError::OperationConstraintViolated) => Err(BackendError::InstanceAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_workflow_instance(
        &self,
        instance: &WorkflowInstance,
        event: HistoryEvent,
    ) -> Result<(), BackendError> {
        let record = self
            .store
            .instance
            .get_by_key(&instance.instance_id, &instance.execution_id)
            .exec()
            .await
            .map_err(|e| not_found_as(e, BackendError::InstanceNotFound))?;
        if !record.state.is_active() {
            debug!(
                instance_id = %instance.instance_id,
                state = ?record.state,
                "cancel of finished instance ignored"
            );
            return Ok(());
        }

        self.store
            .pending_event
            .create(PendingEvent::new(
                &instance.instance_id,
                &instance.execution_id,
                event,
            ))
            .exec()
            .await?;
        Ok(())
    }

    async fn remove_workflow_instance(&self, instance: &WorkflowInstance) -> Result<(), BackendError> {
        let record = self
            .store
            .instance
            .get_by_key(&instance.instance_id, &instance.execution_id)
            .exec()
            .await
            .map_err(|e| not_found_as(e, BackendError::InstanceNotFound))?;
        if record.state.is_active() {
            return Err(BackendError::InstanceNotFinished);
        }

        let mut txn = self.store.txn();
        txn.add(
            self.store
                .instance
                .delete_by_key(&instance.instance_id, &instance.execution_id),
        )
        .add(
            self.store
                .history_event
                .delete_by_instance_execution(&instance.instance_id, &instance.execution_id),
        );
        txn.commit().await?;
        Ok(())
    }

    async fn remove_workflow_instances(&self, options: RemovalOptions) -> Result<(), BackendError> {
        let removable: Vec<InstanceRecord> = self
            .store
            .instance
            .get_all()
            .exec()
            .await?
            .into_iter()
            .filter(|r| !r.state.is_active())
            .filter(|r| match (options.finished_before, r.finished_at) {
                (None, _) => true,
                (Some(before), Some(at)) => at < before,
                (Some(_), None) => false,
            })
            .collect();

        for batch in removable.chunks(options.batch_size.max(1)) {
            let mut txn = self.store.txn();
            for r in batch {
                let (instance_id, execution_id) = (&r.instance.instance_id, &r.instance.execution_id);
                txn.add(self.store.instance.delete_by_key(instance_id, execution_id))
                    .add(
                        self.store
                            .history_event
                            .delete_by_instance_execution(instance_id, execution_id),
                    );
            }
            txn.commit().await?;
        }
        debug!(removed = removable.len(), "removed finished workflow instances");
        Ok(())
    }

    async fn get_workflow_instance_state(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowInstanceState, BackendError> {
        let record = self
            .store
            .instance
            .get_by_key(&instance.instance_id, &instance.execution_id)
            .exec()
            .await
            .map_err(|e| not_found_as(e, BackendError::InstanceNotFound))?;
        Ok(record.state)
    }

    async fn get_workflow_instance_history(
        &self,
        instance: &WorkflowInstance,
        last_sequence_id: Option<i64>,
    ) -> Result<Vec<HistoryEvent>, BackendError> {
        let records = self
            .store
            .history_event
            .get_after_sequence_id(&instance.instance_id, &instance.execution_id, last_sequence_id)
            .exec()
            .await?;
        Ok(records.into_iter().map(|r| r.event).collect())
    }

    async fn signal_workflow(&self, instance_id: &str, event: HistoryEvent) -> Result<(), BackendError> {
        let executions = self.store.instance.get_by_instance_id(instance_id).exec().await?;
        let Some(active) = executions.iter().find(|e| e.state.is_active()) else {
            return Err(BackendError::InstanceNotFound);
        };

        self.store
            .pending_event
            .create(PendingEvent::new(
                instance_id,
                &active.instance.execution_id,
                event,
            ))
            .exec()
            .await?;
        Ok(())
    }

    async fn prepare_workflow_queues(&self, _queues: &[Queue]) -> Result<(), BackendError> {
        Ok(())
    }

    async fn prepare_activity_queues(&self, _queues: &[Queue]) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get_workflow_task(&self, queues: &[Queue]) -> Result<Option<WorkflowTask>, BackendError> {
        for queue in queues {
            let items = self.store.workflow_queue_item.get_by_queue(queue).exec().await?;
            for mut item in items {
                let instance_id = item.instance.instance_id.clone();
                let execution_id = item.instance.execution_id.clone();

                let lock_op = match self
                    .store
                    .instance_lock
                    .get_by_key(&instance_id, &execution_id)
                    .exec()
                    .await
                {
                    Err(StorageError::NotFound { .. }) => self
                        .store
                        .instance_lock
                        .create(WorkflowInstanceLock::new(
                            &instance_id,
                            &execution_id,
                            &self.identity,
                        ))
                        .with_ttl(self.options.workflow_lock_timeout),
                    Ok(mut lock) if lock.can_be_reassigned_to(&self.identity) => {
                        debug!(
                            %instance_id,
                            previous_worker_instance_id = %lock.worker_instance_id,
                            "taking over lock from previous worker process"
                        );
                        lock.assign_to(&self.identity);
                        self.store
                            .instance_lock
                            .update(lock)
                            .with_ttl(self.options.workflow_lock_timeout)
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(e.into()),
                };

                match self.store.sticky.get_by_key(&instance_id).exec().await {
                    Ok(sticky) if sticky.worker_id != self.identity.worker_id => continue,
                    Ok(_) | Err(StorageError::NotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }

                let now = OffsetDateTime::now_utc();
                let mut pending = self
                    .store
                    .pending_event
                    .get_by_instance_execution(&instance_id, &execution_id)
                    .exec()
                    .await?;
                sort_pending_events(&mut pending);
                let new_events: Vec<HistoryEvent> = pending
                    .into_iter()
                    .map(|p| p.event)
                    .filter(|e| e.is_visible(now))
                    .collect();
                if new_events.is_empty() {
                    continue;
                }

                item.update_last_locked();
                let mut txn = self.store.txn();
                txn.add(lock_op)
                    .add(
                        self.store
                            .sticky
                            .put(WorkflowInstanceSticky::new(&instance_id, &self.identity.worker_id))
                            .with_ttl(self.options.sticky_timeout),
                    )
                    .add(self.store.workflow_queue_item.update(item.clone()));
                match txn.commit().await {
                    Ok(()) => {}
                    Err(StorageError::OperationConstraintViolated) => {
                        debug!(%instance_id, %queue, "lost workflow task to another worker");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }

                let last_sequence_id = self
                    .store
                    .history_event
                    .get_last_sequence_id(&instance_id, &execution_id)
                    .await?;
                debug!(
                    %instance_id,
                    %queue,
                    events = new_events.len(),
                    "claimed workflow task"
                );
                return Ok(Some(WorkflowTask {
                    id: instance_id,
                    instance: item.instance,
                    state: item.state,
                    queue: item.queue,
                    metadata: item.metadata,
                    last_sequence_id,
                    new_events,
                }));
            }
        }
        Ok(None)
    }

    async fn extend_workflow_task(&self, task: &WorkflowTask) -> Result<(), BackendError> {
        let instance_id = &task.instance.instance_id;
        let execution_id = &task.instance.execution_id;

        let mut item = self
            .store
            .workflow_queue_item
            .get_by_key(&task.queue, instance_id, execution_id)
            .exec()
            .await
            .map_err(|e| not_found_as(e, BackendError::InstanceNotFound))?;
        let lock = self.owned_workflow_lock(instance_id, execution_id).await?;

        item.update_last_locked();
        let mut txn = self.store.txn();
        txn.add(
            self.store
                .instance_lock
                .update(lock)
                .with_ttl(self.options.workflow_lock_timeout),
        )
        .add(self.store.workflow_queue_item.update(item));
        match txn.commit().await {
            Ok(()) => Ok(()),
            Err(StorageError::OperationConstraintViolated) => {
                self.owned_workflow_lock(instance_id, execution_id).await?;
                Err(StorageError::OperationConstraintViolated.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_workflow_task(
        &self,
        task: &WorkflowTask,
        completion: WorkflowTaskCompletion,
    ) -> Result<(), BackendError> {
        let instance_id = task.instance.instance_id.as_str();
        let execution_id = task.instance.execution_id.as_str();

        let mut record = self
            .store
            .instance
            .get_by_key(instance_id, execution_id)
            .exec()
            .await
            .map_err(|e| not_found_as(e, BackendError::InstanceNotFound))?;

        let lock = self.owned_workflow_lock(instance_id, execution_id).await?;
        let mut txn = self.store.txn();
        txn.add(self.store.instance_lock.delete(&lock));

        let mut future_events = self
            .store
            .pending_event
            .get_by_instance_execution(instance_id, execution_id)
            .exec()
            .await?;
        sort_pending_events(&mut future_events);

        let mut consumed: HashSet<String> = HashSet::new();
        for event in completion.executed_events {
            if consumed.insert(event.id.clone()) {
                txn.add(
                    self.store
                        .pending_event
                        .delete_by_key(instance_id, execution_id, &event.id),
                );
            }
            if event.event_type == EventType::TimerCanceled {
                for fired in future_events.iter().filter(|p| {
                    p.event.event_type == EventType::TimerFired
                        && p.event.schedule_event_id == event.schedule_event_id
                }) {
                    if consumed.insert(fired.event.id.clone()) {
                        txn.add(self.store.pending_event.delete_by_key(
                            instance_id,
                            execution_id,
                            &fired.event.id,
                        ));
                    }
                }
            }
            txn.add(
                self.store
                    .history_event
                    .create(HistoryRecord::new(instance_id, execution_id, event)),
            );
        }

        for event in completion.activity_events {
            let queue = match &event.attributes {
                EventAttributes::ActivityScheduled {
                    queue: Some(queue), ..
                } => queue.clone(),
                _ => task.queue.clone(),
            };
            txn.add(
                self.store
                    .activity_queue_item
                    .create(ActivityQueueItem::new(&task.instance, queue, event)),
            );
        }

        for event in completion.timer_events {
            txn.add(
                self.store
                    .pending_event
                    .create(PendingEvent::new(instance_id, execution_id, event)),
            );
        }

        let now = OffsetDateTime::now_utc();
        for (target, events) in events_by_workflow_instance(completion.workflow_events) {
            let start = events
                .first()
                .filter(|e| e.event.event_type == EventType::WorkflowExecutionStarted)
                .map(|e| started_queue_and_metadata(&e.event, &task.queue));

            if let Some((queue, metadata)) = start {
                let exists = self
                    .store
                    .instance
                    .exists_by_key(&target.instance_id, &target.execution_id)
                    .exec()
                    .await?;
                if exists {
                    warn!(
                        parent_instance_id = %instance_id,
                        sub_workflow = %target,
                        "sub-workflow instance already exists"
                    );
                    let schedule_event_id = target.parent.as_ref().map_or(0, |p| p.schedule_event_id);
                    txn.add(self.store.pending_event.create(PendingEvent::new(
                        instance_id,
                        execution_id,
                        HistoryEvent::pending(
                            now,
                            EventType::SubWorkflowFailed,
                            EventAttributes::SubWorkflowFailed {
                                error: BackendError::InstanceAlreadyExists.to_string(),
                            },
                            schedule_event_id,
                        ),
                    )));
                    continue;
                }
                txn.add(self.store.instance.create(InstanceRecord::active(
                    target.clone(),
                    queue.clone(),
                    metadata.clone(),
                )))
                .add(
                    self.store
                        .workflow_queue_item
                        .create(WorkflowQueueItem::new(target.clone(), queue, metadata)),
                );
            }

            for ev in events {
                txn.add(self.store.pending_event.create(PendingEvent::new(
                    &target.instance_id,
                    &target.execution_id,
                    ev.event,
                )));
            }
        }

        let state = completion.state;
        let sticky = || {
            self.store
                .sticky
                .put(WorkflowInstanceSticky::new(instance_id, &self.identity.worker_id))
                .with_ttl(self.options.sticky_timeout)
        };
        if self.options.remove_continued_as_new_instances
            && state == WorkflowInstanceState::ContinuedAsNew
        {
            txn.add(self.store.instance.delete_by_key(instance_id, execution_id))
                .add(
                    self.store
                        .workflow_queue_item
                        .delete_by_key(&task.queue, instance_id, execution_id),
                );
        } else if !state.is_active() {
            record.state = state;
            record.finished_at = Some(now);
            txn.add(
                self.store
                    .workflow_queue_item
                    .delete_by_key(&task.queue, instance_id, execution_id),
            )
            .add(self.store.instance.update(record))
            .add(sticky());
        } else {
            record.state = state;
            txn.add(self.store.instance.update(record)).add(sticky());
        }

        match txn.commit().await {
            Ok(()) => {}
            Err(StorageError::OperationConstraintViolated) => {
                // Lost the lock between the read and the commit.
                self.owned_workflow_lock(instance_id, execution_id).await?;
                return Err(StorageError::OperationConstraintViolated.into());
            }
            Err(e) => return Err(e.into()),
        }
        debug!(%instance_id, ?state, "completed workflow task");
        Ok(())
    }

    async fn get_activity_task(&self, queues: &[Queue]) -> Result<Option<ActivityTask>, BackendError> {
        for queue in queues {
            let items = self.store.activity_queue_item.get_by_queue(queue).exec().await?;
            for mut item in items {
                let instance_id = item.workflow_instance_id.clone();
                let event_id = item.event.id.clone();

                let lock_op = match self
                    .store
                    .activity_lock
                    .get_by_key(&instance_id, &event_id)
                    .exec()
                    .await
                {
                    Err(StorageError::NotFound { .. }) => self
                        .store
                        .activity_lock
                        .create(ActivityLock::new(&instance_id, &event_id, &self.identity))
                        .with_ttl(self.options.activity_lock_timeout),
                    Ok(mut lock) if lock.can_be_reassigned_to(&self.identity) => {
                        lock.assign_to(&self.identity);
                        self.store
                            .activity_lock
                            .update(lock)
                            .with_ttl(self.options.activity_lock_timeout)
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(e.into()),
                };

                item.update_last_locked();
                let mut txn = self.store.txn();
                txn.add(lock_op)
                    .add(self.store.activity_queue_item.update(item.clone()));
                match txn.commit().await {
                    Ok(()) => {}
                    Err(StorageError::OperationConstraintViolated) => {
                        debug!(%instance_id, %event_id, %queue, "lost activity task to another worker");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }

                debug!(%instance_id, %event_id, %queue, "claimed activity task");
                return Ok(Some(ActivityTask {
                    id: event_id.clone(),
                    activity_id: event_id,
                    queue: item.queue,
                    instance: WorkflowInstance::new(instance_id, item.workflow_execution_id),
                    event: item.event,
                }));
            }
        }
        Ok(None)
    }

    async fn extend_activity_task(&self, task: &ActivityTask) -> Result<(), BackendError> {
        let instance_id = &task.instance.instance_id;
        let event_id = &task.event.id;
        let not_found = || BackendError::ActivityNotFound {
            activity_id: task.activity_id.clone(),
        };

        let mut item = self
            .store
            .activity_queue_item
            .get_by_key(&task.queue, instance_id, event_id)
            .exec()
            .await
            .map_err(|e| not_found_as(e, not_found()))?;
        let lock = self.owned_activity_lock(instance_id, event_id).await?;

        item.update_last_locked();
        let mut txn = self.store.txn();
        txn.add(
            self.store
                .activity_lock
                .update(lock)
                .with_ttl(self.options.activity_lock_timeout),
        )
        .add(self.store.activity_queue_item.update(item));
        match txn.commit().await {
            Ok(()) => Ok(()),
            Err(StorageError::OperationConstraintViolated) => {
                self.owned_activity_lock(instance_id, event_id).await?;
                Err(StorageError::OperationConstraintViolated.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_activity_task(
        &self,
        task: &ActivityTask,
        result: HistoryEvent,
    ) -> Result<(), BackendError> {
        let instance_id = &task.instance.instance_id;
        let event_id = &task.event.id;

        self.store
            .activity_queue_item
            .get_by_key(&task.queue, instance_id, event_id)
            .exec()
            .await
            .map_err(|e| {
                not_found_as(
                    e,
                    BackendError::ActivityNotFound {
                        activity_id: task.activity_id.clone(),
                    },
                )
            })?;

        // The item is deleted without a version check: completion wins over
        // a concurrent extend by the same process.
        let lock = self.owned_activity_lock(instance_id, event_id).await?;
        let mut txn = self.store.txn();
        txn.add(self.store.activity_lock.delete(&lock))
            .add(
                self.store
                    .activity_queue_item
                    .delete_by_key(&task.queue, instance_id, event_id),
            )
            .add(self.store.pending_event.create(PendingEvent::new(
                instance_id,
                &task.instance.execution_id,
                result,
            )));
        match txn.commit().await {
            Ok(()) => {}
            Err(StorageError::OperationConstraintViolated) => {
                self.owned_activity_lock(instance_id, event_id).await?;
                return Err(StorageError::OperationConstraintViolated.into());
            }
            Err(e) => return Err(e.into()),
        }
        debug!(%instance_id, %event_id, "completed activity task");
        Ok(())
    }

    async fn get_stats(&self) -> Result<Stats, BackendError> {
        let now = OffsetDateTime::now_utc();
        let items = self.store.workflow_queue_item.get_all().exec().await?;

        let mut stats = Stats {
            active_workflow_instances: items.len() as i64,
            ..Stats::default()
        };
        for item in items {
            let (instance_id, execution_id) = (&item.instance.instance_id, &item.instance.execution_id);
            let locked = self
                .store
                .instance_lock
                .exists_by_key(instance_id, execution_id)
                .exec()
                .await?;
            if locked {
                continue;
            }
            let pending = self
                .store
                .pending_event
                .get_by_instance_execution(instance_id, execution_id)
                .exec()
                .await?;
            if pending.iter().any(|p| p.event.is_visible(now)) {
                *stats.pending_workflow_tasks.entry(item.queue).or_default() += 1;
            }
        }

        for act in self.store.activity_queue_item.get_all().exec().await? {
            *stats.pending_activity_tasks.entry(act.queue).or_default() += 1;
        }
        Ok(stats)
    }

    fn options(&self) -> &BackendOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    #[test]
    fn pending_events_sort_stably_by_timestamp() {
        let t0 = OffsetDateTime::now_utc();
        let mk = |id: &str, offset: i64| {
            let mut ev = HistoryEvent::new(
                t0 + Duration::seconds(offset),
                EventType::SignalReceived,
                EventAttributes::None,
            );
            ev.id = id.to_string();
            PendingEvent::new("i", "e", ev)
        };
        let mut events = vec![mk("c", 2), mk("a", 0), mk("b1", 1), mk("b2", 1)];
        sort_pending_events(&mut events);
        let ids: Vec<_> = events.iter().map(|p| p.event.id.as_str()).collect();
        assert_eq!(ids, ["a", "b1", "b2", "c"]);
    }

    #[test]
    fn started_event_routes_to_its_queue() {
        let fallback = Queue::new("parent");
        let ev = HistoryEvent::new(
            OffsetDateTime::now_utc(),
            EventType::WorkflowExecutionStarted,
            EventAttributes::ExecutionStarted {
                name: "wf".into(),
                queue: None,
                metadata: Metadata::new(),
                inputs: serde_json::Value::Null,
            },
        );
        assert_eq!(started_queue_and_metadata(&ev, &fallback).0, fallback);
    }
}
