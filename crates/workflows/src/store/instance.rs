use cplane_storage::{
    keys, DeleteOp, ExistsOp, GetOp, GetPrefixOp, PutOp, SharedClient, SortOrder, SortTarget,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Metadata, Queue, WorkflowInstance, WorkflowInstanceState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    #[serde(skip)]
    version: i64,
    pub instance: WorkflowInstance,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub queue: Queue,
    #[serde(default)]
    pub metadata: Metadata,
    pub state: WorkflowInstanceState,
}

cplane_storage::impl_value!(InstanceRecord);

impl InstanceRecord {
    pub fn active(instance: WorkflowInstance, queue: Queue, metadata: Metadata) -> Self {
        Self {
            version: 0,
            instance,
            created_at: OffsetDateTime::now_utc(),
            finished_at: None,
            queue,
            metadata,
            state: WorkflowInstanceState::Active,
        }
    }
}

/// Executions under `<root>/workflows/instances/<instance>/<execution>`.
pub struct InstanceStore {
    client: SharedClient,
    root: String,
}

impl InstanceStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn instances_prefix(&self) -> String {
        keys::prefix(&["/", self.root.as_str(), "workflows", "instances"])
    }

    pub fn instance_id_prefix(&self, instance_id: &str) -> String {
        keys::prefix(&[self.instances_prefix().as_str(), instance_id])
    }

    pub fn key(&self, instance_id: &str, execution_id: &str) -> String {
        keys::key(&[self.instance_id_prefix(instance_id).as_str(), execution_id])
    }

    pub fn exists_by_key(&self, instance_id: &str, execution_id: &str) -> ExistsOp {
        ExistsOp::new(self.client.clone(), self.key(instance_id, execution_id))
    }

    pub fn get_by_key(&self, instance_id: &str, execution_id: &str) -> GetOp<InstanceRecord> {
        GetOp::new(self.client.clone(), self.key(instance_id, execution_id))
    }

    /// Every execution of one instance ID.
    pub fn get_by_instance_id(&self, instance_id: &str) -> GetPrefixOp<InstanceRecord> {
        GetPrefixOp::new(self.client.clone(), self.instance_id_prefix(instance_id))
    }

    /// Every execution, newest first.
    pub fn get_all(&self) -> GetPrefixOp<InstanceRecord> {
        GetPrefixOp::new(self.client.clone(), self.instances_prefix())
            .sort_by(SortTarget::CreateRevision, SortOrder::Descend)
    }

    pub fn create(&self, item: InstanceRecord) -> PutOp<InstanceRecord> {
        let key = self.key(&item.instance.instance_id, &item.instance.execution_id);
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn update(&self, item: InstanceRecord) -> PutOp<InstanceRecord> {
        let key = self.key(&item.instance.instance_id, &item.instance.execution_id);
        PutOp::update(self.client.clone(), key, item)
    }

    pub fn delete_by_key(&self, instance_id: &str, execution_id: &str) -> DeleteOp {
        DeleteOp::key(self.client.clone(), self.key(instance_id, execution_id))
    }
}
