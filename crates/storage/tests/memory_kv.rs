//! Integration tests for the versioned store running on `MemoryKv`.
//!
//! Runs the backend-agnostic conformance suite, then covers behavior that
//! needs control over the store itself (forcing watches closed).

use std::sync::Arc;
use std::time::Duration;

use cplane_storage::conformance::run_conformance_suite;
use cplane_storage::{EventType, MemoryKv, PutOp, SharedClient, StorageError, WatchOp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Note {
    #[serde(skip)]
    version: i64,
    text: String,
}

cplane_storage::impl_value!(Note);

fn note(text: &str) -> Note {
    Note {
        version: 0,
        text: text.to_string(),
    }
}

// ──────────────────────────────────────────────
// 1. Conformance
// ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_kv_passes_conformance() {
    let report = run_conformance_suite(|| async { MemoryKv::new() }).await;
    assert!(report.failed == 0, "{report}");
    assert!(report.total > 30);
}

// ──────────────────────────────────────────────
// 2. Server-side watch termination
// ──────────────────────────────────────────────

#[tokio::test]
async fn subscription_reports_watch_closed() {
    let kv = MemoryKv::new();
    let client: SharedClient = Arc::new(kv.clone());

    let op = WatchOp::<Note>::prefix(client.clone(), "/notes");
    let mut sub = op.subscribe().await.unwrap();
    kv.close_watches().await;

    let ev = sub.next().await.unwrap();
    assert_eq!(ev.event_type, EventType::Error);
    assert!(matches!(ev.err, Some(StorageError::WatchClosed)));
    assert!(sub.next().await.is_none());

    // The op can be restarted after the store closed it.
    let mut again = op.subscribe().await.unwrap();
    PutOp::put(client, "/notes/1", note("hi")).exec().await.unwrap();
    let ev = again.next().await.unwrap();
    assert_eq!(ev.event_type, EventType::Put);
    assert_eq!(ev.value.unwrap().text, "hi");
}

#[tokio::test]
async fn until_surfaces_watch_closed() {
    let kv = MemoryKv::new();
    let client: SharedClient = Arc::new(kv.clone());

    let closer = kv.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.close_watches().await;
    });

    let op = WatchOp::<Note>::key(client, "/notes/1");
    let err = op
        .until(Duration::from_secs(5), |_| false)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::WatchClosed));
}

#[tokio::test]
async fn handler_sees_error_event_on_close() {
    let kv = MemoryKv::new();
    let client: SharedClient = Arc::new(kv.clone());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let op = WatchOp::<Note>::key(client, "/notes/1");
    op.watch(move |ev| {
        let _ = tx.send(ev.event_type);
    })
    .await
    .unwrap();
    kv.close_watches().await;

    let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(got, Some(EventType::Error));
}

#[tokio::test]
async fn dropping_op_closes_subscription() {
    let client: SharedClient = Arc::new(MemoryKv::new());
    let op = WatchOp::<Note>::key(client, "/notes/1");
    let mut sub = op.subscribe().await.unwrap();
    drop(op);
    assert!(sub.next().await.is_none());
}
