//! Dispatchable work markers.
//!
//! A queue item's version is the guard for claiming a task: the claim
//! transaction rewrites the item, so two workers racing for it cannot both
//! commit.

use cplane_storage::{keys, DeleteOp, GetOp, GetPrefixOp, PutOp, SharedClient, WatchOp};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::history::HistoryEvent;
use crate::model::{Metadata, Queue, WorkflowInstance, WorkflowInstanceState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowQueueItem {
    #[serde(skip)]
    version: i64,
    pub instance: WorkflowInstance,
    pub state: WorkflowInstanceState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub queue: Queue,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_locked: Option<OffsetDateTime>,
}

cplane_storage::impl_value!(WorkflowQueueItem);

impl WorkflowQueueItem {
    pub fn new(instance: WorkflowInstance, queue: Queue, metadata: Metadata) -> Self {
        Self {
            version: 0,
            instance,
            state: WorkflowInstanceState::Active,
            created_at: OffsetDateTime::now_utc(),
            queue,
            metadata,
            last_locked: None,
        }
    }

    pub fn update_last_locked(&mut self) {
        self.last_locked = Some(OffsetDateTime::now_utc());
    }
}

/// `<root>/workflows/workflow_queue_items/<queue>/<instance>/<execution>`.
pub struct WorkflowQueueItemStore {
    client: SharedClient,
    root: String,
}

impl WorkflowQueueItemStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn all_queues_prefix(&self) -> String {
        keys::prefix(&["/", self.root.as_str(), "workflows", "workflow_queue_items"])
    }

    pub fn queue_prefix(&self, queue: &Queue) -> String {
        keys::prefix(&[self.all_queues_prefix().as_str(), queue.as_str()])
    }

    pub fn key(&self, queue: &Queue, instance_id: &str, execution_id: &str) -> String {
        keys::key(&[self.queue_prefix(queue).as_str(), instance_id, execution_id])
    }

    pub fn get_all(&self) -> GetPrefixOp<WorkflowQueueItem> {
        GetPrefixOp::new(self.client.clone(), self.all_queues_prefix())
    }

    pub fn get_by_key(
        &self,
        queue: &Queue,
        instance_id: &str,
        execution_id: &str,
    ) -> GetOp<WorkflowQueueItem> {
        GetOp::new(self.client.clone(), self.key(queue, instance_id, execution_id))
    }

    pub fn get_by_queue(&self, queue: &Queue) -> GetPrefixOp<WorkflowQueueItem> {
        GetPrefixOp::new(self.client.clone(), self.queue_prefix(queue))
    }

    pub fn create(&self, item: WorkflowQueueItem) -> PutOp<WorkflowQueueItem> {
        let key = self.item_key(&item);
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn put(&self, item: WorkflowQueueItem) -> PutOp<WorkflowQueueItem> {
        let key = self.item_key(&item);
        PutOp::put(self.client.clone(), key, item)
    }

    pub fn update(&self, item: WorkflowQueueItem) -> PutOp<WorkflowQueueItem> {
        let key = self.item_key(&item);
        PutOp::update(self.client.clone(), key, item)
    }

    pub fn delete_by_key(&self, queue: &Queue, instance_id: &str, execution_id: &str) -> DeleteOp {
        DeleteOp::key(self.client.clone(), self.key(queue, instance_id, execution_id))
    }

    fn item_key(&self, item: &WorkflowQueueItem) -> String {
        self.key(
            &item.queue,
            &item.instance.instance_id,
            &item.instance.execution_id,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityQueueItem {
    #[serde(skip)]
    version: i64,
    pub workflow_instance_id: String,
    pub workflow_execution_id: String,
    pub queue: Queue,
    /// The `ActivityScheduled` event.
    pub event: HistoryEvent,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_locked: Option<OffsetDateTime>,
}

cplane_storage::impl_value!(ActivityQueueItem);

impl ActivityQueueItem {
    pub fn new(instance: &WorkflowInstance, queue: Queue, event: HistoryEvent) -> Self {
        Self {
            version: 0,
            workflow_instance_id: instance.instance_id.clone(),
            workflow_execution_id: instance.execution_id.clone(),
            queue,
            event,
            last_locked: None,
        }
    }

    pub fn update_last_locked(&mut self) {
        self.last_locked = Some(OffsetDateTime::now_utc());
    }
}

/// `<root>/workflows/activity_queue_items/<queue>/<instance>/<event>`.
pub struct ActivityQueueItemStore {
    client: SharedClient,
    root: String,
}

impl ActivityQueueItemStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn all_queues_prefix(&self) -> String {
        keys::prefix(&["/", self.root.as_str(), "workflows", "activity_queue_items"])
    }

    pub fn queue_prefix(&self, queue: &Queue) -> String {
        keys::prefix(&[self.all_queues_prefix().as_str(), queue.as_str()])
    }

    pub fn key(&self, queue: &Queue, instance_id: &str, event_id: &str) -> String {
        keys::key(&[self.queue_prefix(queue).as_str(), instance_id, event_id])
    }

    pub fn get_all(&self) -> GetPrefixOp<ActivityQueueItem> {
        GetPrefixOp::new(self.client.clone(), self.all_queues_prefix())
    }

    pub fn get_by_key(
        &self,
        queue: &Queue,
        instance_id: &str,
        event_id: &str,
    ) -> GetOp<ActivityQueueItem> {
        GetOp::new(self.client.clone(), self.key(queue, instance_id, event_id))
    }

    pub fn get_by_queue(&self, queue: &Queue) -> GetPrefixOp<ActivityQueueItem> {
        GetPrefixOp::new(self.client.clone(), self.queue_prefix(queue))
    }

    pub fn create(&self, item: ActivityQueueItem) -> PutOp<ActivityQueueItem> {
        let key = self.key(&item.queue, &item.workflow_instance_id, &item.event.id);
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn update(&self, item: ActivityQueueItem) -> PutOp<ActivityQueueItem> {
        let key = self.key(&item.queue, &item.workflow_instance_id, &item.event.id);
        PutOp::update(self.client.clone(), key, item)
    }

    pub fn delete_by_key(&self, queue: &Queue, instance_id: &str, event_id: &str) -> DeleteOp {
        DeleteOp::key(self.client.clone(), self.key(queue, instance_id, event_id))
    }

    pub fn watch_all(&self) -> WatchOp<ActivityQueueItem> {
        WatchOp::prefix(self.client.clone(), self.all_queues_prefix())
    }
}
