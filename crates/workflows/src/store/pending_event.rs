use cplane_storage::{keys, DeleteOp, GetPrefixOp, PutOp, SharedClient, WatchOp};
use serde::{Deserialize, Serialize};

use crate::history::HistoryEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEvent {
    #[serde(skip)]
    version: i64,
    pub workflow_instance_id: String,
    pub workflow_execution_id: String,
    pub event: HistoryEvent,
}

cplane_storage::impl_value!(PendingEvent);

impl PendingEvent {
    pub fn new(instance_id: &str, execution_id: &str, event: HistoryEvent) -> Self {
        Self {
            version: 0,
            workflow_instance_id: instance_id.to_string(),
            workflow_execution_id: execution_id.to_string(),
            event,
        }
    }
}

/// Not-yet-applied events under
/// `<root>/workflows/pending_events/<instance>/<execution>/<event>`.
pub struct PendingEventStore {
    client: SharedClient,
    root: String,
}

impl PendingEventStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn all_events_prefix(&self) -> String {
        keys::prefix(&["/", self.root.as_str(), "workflows", "pending_events"])
    }

    pub fn instance_execution_prefix(&self, instance_id: &str, execution_id: &str) -> String {
        keys::prefix(&[self.all_events_prefix().as_str(), instance_id, execution_id])
    }

    pub fn key(&self, instance_id: &str, execution_id: &str, event_id: &str) -> String {
        keys::key(&[
            self.instance_execution_prefix(instance_id, execution_id).as_str(),
            event_id,
        ])
    }

    pub fn get_by_instance_execution(
        &self,
        instance_id: &str,
        execution_id: &str,
    ) -> GetPrefixOp<PendingEvent> {
        GetPrefixOp::new(
            self.client.clone(),
            self.instance_execution_prefix(instance_id, execution_id),
        )
    }

    pub fn create(&self, item: PendingEvent) -> PutOp<PendingEvent> {
        let key = self.key(
            &item.workflow_instance_id,
            &item.workflow_execution_id,
            &item.event.id,
        );
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn put(&self, item: PendingEvent) -> PutOp<PendingEvent> {
        let key = self.key(
            &item.workflow_instance_id,
            &item.workflow_execution_id,
            &item.event.id,
        );
        PutOp::put(self.client.clone(), key, item)
    }

    pub fn delete_by_key(&self, instance_id: &str, execution_id: &str, event_id: &str) -> DeleteOp {
        DeleteOp::key(self.client.clone(), self.key(instance_id, execution_id, event_id))
    }

    pub fn delete_by_instance_execution(&self, instance_id: &str, execution_id: &str) -> DeleteOp {
        DeleteOp::prefix(
            self.client.clone(),
            self.instance_execution_prefix(instance_id, execution_id),
        )
    }

    /// Every new pending event, for any execution.
    pub fn watch_all(&self) -> WatchOp<PendingEvent> {
        WatchOp::prefix(self.client.clone(), self.all_events_prefix())
    }
}
