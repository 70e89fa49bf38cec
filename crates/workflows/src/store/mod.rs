//! Per-entity stores for the workflow backend, all rooted at
//! `<root>/workflows/`.

mod history_event;
mod instance;
mod lock;
mod pending_event;
mod queue_item;
mod sticky;

pub use history_event::{HistoryEventStore, HistoryRecord};
pub use instance::{InstanceRecord, InstanceStore};
pub use lock::{ActivityLock, ActivityLockStore, WorkflowInstanceLock, WorkflowInstanceLockStore};
pub use pending_event::{PendingEvent, PendingEventStore};
pub use queue_item::{ActivityQueueItem, ActivityQueueItemStore, WorkflowQueueItem, WorkflowQueueItemStore};
pub use sticky::{StickyStore, WorkflowInstanceSticky};

use cplane_storage::{SharedClient, Txn};

pub struct Store {
    client: SharedClient,
    pub activity_lock: ActivityLockStore,
    pub activity_queue_item: ActivityQueueItemStore,
    pub history_event: HistoryEventStore,
    pub pending_event: PendingEventStore,
    pub instance: InstanceStore,
    pub instance_lock: WorkflowInstanceLockStore,
    pub sticky: StickyStore,
    pub workflow_queue_item: WorkflowQueueItemStore,
}

impl Store {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            activity_lock: ActivityLockStore::new(client.clone(), root.clone()),
            activity_queue_item: ActivityQueueItemStore::new(client.clone(), root.clone()),
            history_event: HistoryEventStore::new(client.clone(), root.clone()),
            pending_event: PendingEventStore::new(client.clone(), root.clone()),
            instance: InstanceStore::new(client.clone(), root.clone()),
            instance_lock: WorkflowInstanceLockStore::new(client.clone(), root.clone()),
            sticky: StickyStore::new(client.clone(), root.clone()),
            workflow_queue_item: WorkflowQueueItemStore::new(client.clone(), root),
            client,
        }
    }

    pub fn txn(&self) -> Txn {
        Txn::new(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cplane_storage::MemoryKv;

    use super::*;
    use crate::model::Queue;

    #[test]
    fn keys_are_namespaced_under_root() {
        let store = Store::new(Arc::new(MemoryKv::new()), "cp");
        assert_eq!(store.instance.key("wf", "ex"), "/cp/workflows/instances/wf/ex");
        assert_eq!(
            store.history_event.key("wf", "ex", 10),
            "/cp/workflows/history_events/wf/ex/000000000000000a"
        );
        assert_eq!(
            store.workflow_queue_item.key(&Queue::default(), "wf", "ex"),
            "/cp/workflows/workflow_queue_items/default/wf/ex"
        );
        assert_eq!(
            store.activity_lock.key("wf", "ev"),
            "/cp/workflows/activity_locks/wf/ev"
        );
        assert_eq!(
            store.sticky.key("wf"),
            "/cp/workflows/workflow_instance_stickies/wf"
        );
    }

    #[test]
    fn instance_prefix_does_not_match_longer_ids() {
        let store = Store::new(Arc::new(MemoryKv::new()), "cp");
        let prefix = store.instance.instance_id_prefix("db-1");
        assert!(!store.instance.key("db-10", "ex").starts_with(&prefix));
        assert!(store.instance.key("db-1", "ex").starts_with(&prefix));
    }
}
