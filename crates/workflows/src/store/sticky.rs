use cplane_storage::{keys, GetOp, PutOp, SharedClient};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A leased hint that the execution's next task should go to `worker_id`,
/// which still holds its state in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstanceSticky {
    #[serde(skip)]
    version: i64,
    pub workflow_instance_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub worker_id: String,
}

cplane_storage::impl_value!(WorkflowInstanceSticky);

impl WorkflowInstanceSticky {
    pub fn new(instance_id: &str, worker_id: &str) -> Self {
        Self {
            version: 0,
            workflow_instance_id: instance_id.to_string(),
            created_at: OffsetDateTime::now_utc(),
            worker_id: worker_id.to_string(),
        }
    }
}

/// `<root>/workflows/workflow_instance_stickies/<instance>`.
pub struct StickyStore {
    client: SharedClient,
    root: String,
}

impl StickyStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn key(&self, instance_id: &str) -> String {
        keys::key(&[
            "/",
            self.root.as_str(),
            "workflows",
            "workflow_instance_stickies",
            instance_id,
        ])
    }

    pub fn get_by_key(&self, instance_id: &str) -> GetOp<WorkflowInstanceSticky> {
        GetOp::new(self.client.clone(), self.key(instance_id))
    }

    pub fn put(&self, item: WorkflowInstanceSticky) -> PutOp<WorkflowInstanceSticky> {
        let key = self.key(&item.workflow_instance_id);
        PutOp::put(self.client.clone(), key, item)
    }
}
