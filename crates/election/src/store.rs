use std::fmt;

use cplane_storage::{keys, DeleteValueOp, GetOp, PutOp, SharedClient, WatchOp};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Name of an election, e.g. `"migrations"` or `"scheduler"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElectionName(String);

impl ElectionName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElectionName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ElectionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The leadership claim. Stored under a lease so it disappears when the
/// holder stops refreshing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredElection {
    #[serde(skip)]
    version: i64,
    pub name: ElectionName,
    pub leader_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

cplane_storage::impl_value!(StoredElection);

impl StoredElection {
    pub fn new(name: ElectionName, leader_id: impl Into<String>) -> Self {
        Self {
            version: 0,
            name,
            leader_id: leader_id.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

pub struct ElectionStore {
    client: SharedClient,
    root: String,
}

impl ElectionStore {
    pub fn new(client: SharedClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn key(&self, name: &ElectionName) -> String {
        keys::key(&["/", self.root.as_str(), "elections", name.as_str()])
    }

    pub fn get_by_key(&self, name: &ElectionName) -> GetOp<StoredElection> {
        GetOp::new(self.client.clone(), self.key(name))
    }

    pub fn create(&self, item: StoredElection) -> PutOp<StoredElection> {
        PutOp::create(self.client.clone(), self.key(&item.name), item)
    }

    pub fn update(&self, item: StoredElection) -> PutOp<StoredElection> {
        PutOp::update(self.client.clone(), self.key(&item.name), item)
    }

    pub fn delete(&self, item: &StoredElection) -> DeleteValueOp {
        DeleteValueOp::new(self.client.clone(), self.key(&item.name), item)
    }

    pub fn watch(&self, name: &ElectionName) -> WatchOp<StoredElection> {
        WatchOp::key(self.client.clone(), self.key(name))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cplane_storage::MemoryKv;

    use super::*;

    #[tokio::test]
    async fn keys_live_under_root() {
        let store = ElectionStore::new(Arc::new(MemoryKv::new()), "cp");
        assert_eq!(store.key(&"scheduler".into()), "/cp/elections/scheduler");
    }

    #[test]
    fn record_serializes_rfc3339_timestamp() {
        let rec = StoredElection::new("m".into(), "host-1");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["name"], "m");
        assert_eq!(json["leader_id"], "host-1");
        assert!(json["created_at"].as_str().unwrap().contains('T'));
        assert!(json.get("version").is_none());
    }
}
