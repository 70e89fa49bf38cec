//! Leased task locks.
//!
//! Locks are created with a TTL and vanish when the holder stops extending
//! them. A lock held by an earlier process of the same worker (same
//! `worker_id`, different `worker_instance_id`) may be taken over without
//! waiting for it to expire.

use cplane_storage::{keys, DeleteOp, DeleteValueOp, ExistsOp, GetOp, PutOp, SharedClient};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::worker::WorkerIdentity;

fn can_be_reassigned(worker_id: &str, worker_instance_id: &str, to: &WorkerIdentity) -> bool {
    worker_id == to.worker_id && worker_instance_id != to.worker_instance_id
}

fn is_held(worker_id: &str, worker_instance_id: &str, by: &WorkerIdentity) -> bool {
    worker_id == by.worker_id && worker_instance_id == by.worker_instance_id
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstanceLock {
    #[serde(skip)]
    version: i64,
    pub workflow_instance_id: String,
    pub workflow_execution_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub worker_id: String,
    pub worker_instance_id: String,
}

cplane_storage::impl_value!(WorkflowInstanceLock);

impl WorkflowInstanceLock {
    pub fn new(instance_id: &str, execution_id: &str, owner: &WorkerIdentity) -> Self {
        Self {
            version: 0,
            workflow_instance_id: instance_id.to_string(),
            workflow_execution_id: execution_id.to_string(),
            created_at: OffsetDateTime::now_utc(),
            worker_id: owner.worker_id.clone(),
            worker_instance_id: owner.worker_instance_id.clone(),
        }
    }

    pub fn can_be_reassigned_to(&self, to: &WorkerIdentity) -> bool {
        can_be_reassigned(&self.worker_id, &self.worker_instance_id, to)
    }

    /// Whether this exact worker process owns the lock.
    pub fn is_held_by(&self, by: &WorkerIdentity) -> bool {
        is_held(&self.worker_id, &self.worker_instance_id, by)
    }

    pub fn assign_to(&mut self, to: &WorkerIdentity) {
        self.worker_id = to.worker_id.clone();
        self.worker_instance_id = to.worker_instance_id.clone();
    }
}

/// `<root>/workflows/workflow_instance_locks/<instance>/<execution>`.
pub struct WorkflowInstanceLockStore {
    client: SharedClient,
    root: String,
}

impl WorkflowInstanceLockStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn key(&self, instance_id: &str, execution_id: &str) -> String {
        keys::key(&[
            "/",
            self.root.as_str(),
            "workflows",
            "workflow_instance_locks",
            instance_id,
            execution_id,
        ])
    }

    pub fn exists_by_key(&self, instance_id: &str, execution_id: &str) -> ExistsOp {
        ExistsOp::new(self.client.clone(), self.key(instance_id, execution_id))
    }

    pub fn get_by_key(&self, instance_id: &str, execution_id: &str) -> GetOp<WorkflowInstanceLock> {
        GetOp::new(self.client.clone(), self.key(instance_id, execution_id))
    }

    pub fn create(&self, item: WorkflowInstanceLock) -> PutOp<WorkflowInstanceLock> {
        let key = self.key(&item.workflow_instance_id, &item.workflow_execution_id);
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn update(&self, item: WorkflowInstanceLock) -> PutOp<WorkflowInstanceLock> {
        let key = self.key(&item.workflow_instance_id, &item.workflow_execution_id);
        PutOp::update(self.client.clone(), key, item)
    }

    pub fn delete_by_key(&self, instance_id: &str, execution_id: &str) -> DeleteOp {
        DeleteOp::key(self.client.clone(), self.key(instance_id, execution_id))
    }

    /// Delete only if the lock is unchanged since `item` was read. A lock
    /// that was never stored guards that the key is still absent.
    pub fn delete(&self, item: &WorkflowInstanceLock) -> DeleteValueOp {
        let key = self.key(&item.workflow_instance_id, &item.workflow_execution_id);
        DeleteValueOp::new(self.client.clone(), key, item)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLock {
    #[serde(skip)]
    version: i64,
    pub workflow_instance_id: String,
    pub event_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub worker_id: String,
    pub worker_instance_id: String,
}

cplane_storage::impl_value!(ActivityLock);

impl ActivityLock {
    pub fn new(instance_id: &str, event_id: &str, owner: &WorkerIdentity) -> Self {
        Self {
            version: 0,
            workflow_instance_id: instance_id.to_string(),
            event_id: event_id.to_string(),
            created_at: OffsetDateTime::now_utc(),
            worker_id: owner.worker_id.clone(),
            worker_instance_id: owner.worker_instance_id.clone(),
        }
    }

    pub fn can_be_reassigned_to(&self, to: &WorkerIdentity) -> bool {
        can_be_reassigned(&self.worker_id, &self.worker_instance_id, to)
    }

    /// Whether this exact worker process owns the lock.
    pub fn is_held_by(&self, by: &WorkerIdentity) -> bool {
        is_held(&self.worker_id, &self.worker_instance_id, by)
    }

    pub fn assign_to(&mut self, to: &WorkerIdentity) {
        self.worker_id = to.worker_id.clone();
        self.worker_instance_id = to.worker_instance_id.clone();
    }
}

/// `<root>/workflows/activity_locks/<instance>/<event>`.
pub struct ActivityLockStore {
    client: SharedClient,
    root: String,
}

impl ActivityLockStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn key(&self, instance_id: &str, event_id: &str) -> String {
        keys::key(&[
            "/",
            self.root.as_str(),
            "workflows",
            "activity_locks",
            instance_id,
            event_id,
        ])
    }

    pub fn get_by_key(&self, instance_id: &str, event_id: &str) -> GetOp<ActivityLock> {
        GetOp::new(self.client.clone(), self.key(instance_id, event_id))
    }

    pub fn create(&self, item: ActivityLock) -> PutOp<ActivityLock> {
        let key = self.key(&item.workflow_instance_id, &item.event_id);
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn update(&self, item: ActivityLock) -> PutOp<ActivityLock> {
        let key = self.key(&item.workflow_instance_id, &item.event_id);
        PutOp::update(self.client.clone(), key, item)
    }

    pub fn delete(&self, item: &ActivityLock) -> DeleteValueOp {
        let key = self.key(&item.workflow_instance_id, &item.event_id);
        DeleteValueOp::new(self.client.clone(), key, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_restarted_worker_can_take_over() {
        let old = WorkerIdentity::new("host-1");
        let lock = WorkflowInstanceLock::new("i", "e", &old);

        assert!(!lock.can_be_reassigned_to(&old));
        assert!(lock.can_be_reassigned_to(&WorkerIdentity::new("host-1")));
        assert!(!lock.can_be_reassigned_to(&WorkerIdentity::new("host-2")));
    }

    #[test]
    fn ownership_needs_the_same_process() {
        let owner = WorkerIdentity::new("host-1");
        let lock = ActivityLock::new("i", "ev", &owner);

        assert!(lock.is_held_by(&owner));
        assert!(!lock.is_held_by(&WorkerIdentity::new("host-1")));
        assert!(!lock.is_held_by(&WorkerIdentity::new("host-2")));
    }
}
