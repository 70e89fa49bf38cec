use cplane_storage::{
    keys, DeleteOp, GetPrefixOp, GetRangeOp, PutOp, SharedClient, SortOrder, SortTarget,
    StorageError,
};
use serde::{Deserialize, Serialize};

use crate::history::HistoryEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(skip)]
    version: i64,
    pub workflow_instance_id: String,
    pub workflow_execution_id: String,
    pub event: HistoryEvent,
}

cplane_storage::impl_value!(HistoryRecord);

impl HistoryRecord {
    pub fn new(instance_id: &str, execution_id: &str, event: HistoryEvent) -> Self {
        Self {
            version: 0,
            workflow_instance_id: instance_id.to_string(),
            workflow_execution_id: execution_id.to_string(),
            event,
        }
    }
}

/// Applied events under
/// `<root>/workflows/history_events/<instance>/<execution>/<sequence>`.
///
/// The sequence segment is fixed-width hex, so key order is sequence order.
pub struct HistoryEventStore {
    client: SharedClient,
    root: String,
}

impl HistoryEventStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn instance_execution_prefix(&self, instance_id: &str, execution_id: &str) -> String {
        keys::prefix(&[
            "/",
            self.root.as_str(),
            "workflows",
            "history_events",
            instance_id,
            execution_id,
        ])
    }

    pub fn key(&self, instance_id: &str, execution_id: &str, sequence_id: i64) -> String {
        keys::key(&[
            self.instance_execution_prefix(instance_id, execution_id),
            keys::sequence_key(sequence_id),
        ])
    }

    /// The highest sequence ID in the execution's history, or 0 when empty.
    pub async fn get_last_sequence_id(
        &self,
        instance_id: &str,
        execution_id: &str,
    ) -> Result<i64, StorageError> {
        let prefix = self.instance_execution_prefix(instance_id, execution_id);
        let last = GetPrefixOp::<HistoryRecord>::new(self.client.clone(), prefix)
            .sort_by(SortTarget::Key, SortOrder::Descend)
            .with_limit(1)
            .exec()
            .await?;
        Ok(last.first().map_or(0, |r| r.event.sequence_id))
    }

    /// Events after `last_sequence_id`, or all of them for `None`.
    pub fn get_after_sequence_id(
        &self,
        instance_id: &str,
        execution_id: &str,
        last_sequence_id: Option<i64>,
    ) -> GetRangeOp<HistoryRecord> {
        let start = match last_sequence_id {
            Some(seq) => self.key(instance_id, execution_id, seq.saturating_add(1)),
            None => self.instance_execution_prefix(instance_id, execution_id),
        };
        let end = keys::prefix_range_end(&self.instance_execution_prefix(instance_id, execution_id));
        GetRangeOp::new(self.client.clone(), start, end)
    }

    pub fn create(&self, item: HistoryRecord) -> PutOp<HistoryRecord> {
        let key = self.key(
            &item.workflow_instance_id,
            &item.workflow_execution_id,
            item.event.sequence_id,
        );
        PutOp::create(self.client.clone(), key, item)
    }

    pub fn delete_by_instance_execution(&self, instance_id: &str, execution_id: &str) -> DeleteOp {
        DeleteOp::prefix(
            self.client.clone(),
            self.instance_execution_prefix(instance_id, execution_id),
        )
    }
}
