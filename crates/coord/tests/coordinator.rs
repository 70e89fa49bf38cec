//! Wiring tests: one client shared by election and workflows.

use std::sync::Arc;
use std::time::Duration;

use cplane_coord::{init_test_logging, Config, ConfigError, Coordinator};
use cplane_storage::{MemoryKv, SharedClient};
use cplane_workflows::{
    BackendOptions, EventAttributes, EventType, HistoryEvent, KvBackend, Metadata, Queue, Store,
    WorkflowBackend, WorkflowInstance,
};

fn config(key_root: &str) -> Config {
    Config {
        key_root: key_root.to_string(),
        worker_id: "host-1".to_string(),
        ..Config::default()
    }
}

fn client() -> SharedClient {
    init_test_logging("cplane_coord=debug,cplane_workflows=debug");
    Arc::new(MemoryKv::new())
}

fn started() -> HistoryEvent {
    HistoryEvent::new(
        time::OffsetDateTime::now_utc(),
        EventType::WorkflowExecutionStarted,
        EventAttributes::ExecutionStarted {
            name: "backup".into(),
            queue: None,
            metadata: Metadata::new(),
            inputs: serde_json::Value::Null,
        },
    )
}

// ──────────────────────────────────────────────
// 1. Construction
// ──────────────────────────────────────────────

#[tokio::test]
async fn invalid_config_is_rejected() {
    let bad = Config {
        worker_id: String::new(),
        ..config("cp")
    };
    let err = Coordinator::new(client(), bad).err().expect("must fail");
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[tokio::test]
async fn config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cplane.toml");
    std::fs::write(
        &path,
        "key_root = \"cp\"\nworker_id = \"host-9\"\n[workflows]\nsticky_timeout_secs = 5\n",
    )
    .unwrap();

    let loaded = Config::from_path(&path).unwrap();
    let coord = Coordinator::new(client(), loaded).unwrap();
    assert_eq!(coord.workflows().identity().worker_id, "host-9");
    assert_eq!(
        coord.workflows().options().sticky_timeout,
        Duration::from_secs(5)
    );
}

// ──────────────────────────────────────────────
// 2. Services
// ──────────────────────────────────────────────

#[tokio::test]
async fn candidate_uses_worker_identity() {
    let coord = Coordinator::new(client(), config("cp")).unwrap();
    let candidate = coord.candidate("scheduler", Vec::new());
    assert_eq!(candidate.candidate_id(), "host-1");

    candidate.start().await.unwrap();
    assert!(candidate.is_leader());
    let record = coord
        .elections()
        .store()
        .get_by_key(candidate.election_name())
        .exec()
        .await
        .unwrap();
    assert_eq!(record.leader_id, "host-1");
    candidate.stop().await.unwrap();
}

#[tokio::test]
async fn key_roots_are_isolated() {
    let client = client();
    let coord = Coordinator::new(client.clone(), config("cp-a")).unwrap();
    coord
        .workflows()
        .create_workflow_instance(&WorkflowInstance::new("wf-1", "exec-1"), started())
        .await
        .unwrap();

    let other = KvBackend::new(
        Store::new(client.clone(), "cp-b"),
        BackendOptions::default(),
        "host-2",
    );
    assert!(other.get_workflow_task(&[Queue::default()]).await.unwrap().is_none());

    let task = coord
        .workflows()
        .get_workflow_task(&[Queue::default()])
        .await
        .unwrap()
        .expect("task under the coordinator's root");
    assert_eq!(task.instance.instance_id, "wf-1");
}
