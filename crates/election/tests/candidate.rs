//! Candidate lifecycle and failover tests against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cplane_election::{
    claim_handler, ElectionError, ElectionService, ElectionStore, StoredElection, MIN_TTL,
};
use cplane_storage::kv::{
    KvOp, RangeRequest, RangeResponse, TxnRequest, TxnResponse, WatchRequest, WatchStream,
};
use cplane_storage::{KvClient, LeaseId, MemoryKv, SharedClient, StorageError};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("cplane_election=debug"))
        .with_test_writer()
        .try_init();
}

fn service() -> (SharedClient, ElectionService) {
    init_test_logging();
    let client: SharedClient = Arc::new(MemoryKv::new());
    let svc = ElectionService::new(ElectionStore::new(client.clone(), "test"));
    (client, svc)
}

/// Fails a set number of writes and watch starts, then behaves like the
/// wrapped store. A failed write reports its compares as not holding.
#[derive(Default)]
struct FlakyKv {
    inner: MemoryKv,
    failing_writes: AtomicUsize,
    failing_watches: AtomicUsize,
    writes: AtomicUsize,
    watches: AtomicUsize,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl KvClient for FlakyKv {
    async fn range(&self, req: RangeRequest) -> Result<RangeResponse, StorageError> {
        self.inner.range(req).await
    }

    async fn txn(&self, req: TxnRequest) -> Result<TxnResponse, StorageError> {
        if req.success.iter().any(|op| matches!(op, KvOp::Put { .. })) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.failing_writes) {
                return Ok(TxnResponse::default());
            }
        }
        self.inner.txn(req).await
    }

    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, StorageError> {
        self.inner.grant_lease(ttl).await
    }

    async fn watch(&self, req: WatchRequest) -> Result<WatchStream, StorageError> {
        if take_one(&self.failing_watches) {
            return Err(StorageError::Backend("watch unavailable".into()));
        }
        self.watches.fetch_add(1, Ordering::SeqCst);
        self.inner.watch(req).await
    }
}

fn flaky_service() -> (Arc<FlakyKv>, ElectionService) {
    init_test_logging();
    let kv = Arc::new(FlakyKv::default());
    let client: SharedClient = kv.clone();
    let svc = ElectionService::new(ElectionStore::new(client, "test"));
    (kv, svc)
}

// ──────────────────────────────────────────────
// 1. Single candidate
// ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn basic_lifecycle() {
    let (_, svc) = service();
    let candidate = svc.new_candidate("basic", "host-1", Duration::from_millis(600), Vec::new());

    // Stop is fine when the candidate is not running.
    candidate.stop().await.unwrap();

    candidate.start().await.unwrap();
    assert!(candidate.is_leader());

    // Outlive the TTL a couple of times; the claim must have been refreshed.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(candidate.is_leader());
    candidate.ensure_leader().await.unwrap();

    // Start is idempotent.
    candidate.start().await.unwrap();
    assert!(candidate.is_leader());

    candidate.stop().await.unwrap();
    assert!(!candidate.is_leader());
    candidate.stop().await.unwrap();
    assert!(!candidate.is_leader());

    // Can be restarted after stopping.
    candidate.start().await.unwrap();
    assert!(candidate.is_leader());
    candidate.stop().await.unwrap();
    assert!(!candidate.is_leader());
}

#[tokio::test]
async fn stop_releases_the_record() {
    let (_, svc) = service();
    let candidate = svc.new_candidate("release", "host-1", Duration::from_secs(30), Vec::new());
    candidate.start().await.unwrap();

    let name = candidate.election_name().clone();
    svc.store().get_by_key(&name).exec().await.unwrap();

    candidate.stop().await.unwrap();
    let err = svc.store().get_by_key(&name).exec().await.unwrap_err();
    assert!(matches!(err, cplane_storage::StorageError::NotFound { .. }));
}

#[tokio::test]
async fn errors_receiver_is_taken_once() {
    let (_, svc) = service();
    let candidate = svc.new_candidate("errs", "host-1", Duration::from_secs(30), Vec::new());
    assert!(candidate.errors().is_some());
    assert!(candidate.errors().is_none());
}

// ──────────────────────────────────────────────
// 2. Multiple candidates
// ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follower_takes_over_when_leader_stops() {
    let (_, svc) = service();
    let (elected_tx, mut elected_rx) = mpsc::channel(1);

    let a = svc.new_candidate("multi", "host-1", Duration::from_secs(30), Vec::new());
    let b = svc.new_candidate(
        "multi",
        "host-2",
        Duration::from_secs(30),
        vec![claim_handler(move |_token| {
            let tx = elected_tx.clone();
            async move {
                let _ = tx.send(()).await;
            }
        })],
    );

    a.start().await.unwrap();
    assert!(a.is_leader());
    b.start().await.unwrap();
    assert!(!b.is_leader());

    match b.ensure_leader().await {
        Err(ElectionError::NonLeader { candidate_id, .. }) => assert_eq!(candidate_id, "host-2"),
        other => panic!("expected NonLeader, got {other:?}"),
    }

    a.stop().await.unwrap();
    assert!(!a.is_leader());

    tokio::time::timeout(Duration::from_secs(5), elected_rx.recv())
        .await
        .expect("timed out waiting for host-2 to claim leadership");
    assert!(b.is_leader());
    assert!(!a.is_leader());

    b.stop().await.unwrap();
    assert!(!b.is_leader());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_claim_fails_over_within_ttl() {
    let (client, svc) = service();
    let ttl = Duration::from_millis(400);

    // A leader that died without releasing: its record is only kept alive by
    // a lease nobody renews.
    let store = ElectionStore::new(client, "test");
    store
        .create(StoredElection::new("crash".into(), "dead-host"))
        .with_ttl(ttl)
        .exec()
        .await
        .unwrap();

    let survivor = svc.new_candidate("crash", "host-2", Duration::from_secs(30), Vec::new());
    survivor.start().await.unwrap();
    assert!(!survivor.is_leader());

    let deadline = tokio::time::Instant::now() + ttl * 3;
    while !survivor.is_leader() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "survivor did not take over after the claim expired"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    survivor.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_leader() {
    let (_, svc) = service();
    let candidates: Vec<_> = (0..5)
        .map(|i| {
            svc.new_candidate(
                "contended",
                format!("host-{i}"),
                Duration::from_millis(600),
                Vec::new(),
            )
        })
        .collect();

    let mut starts = Vec::new();
    for c in &candidates {
        let c = c.clone();
        starts.push(tokio::spawn(async move { c.start().await }));
    }
    for s in starts {
        s.await.unwrap().unwrap();
    }

    for _ in 0..10 {
        let leaders = candidates.iter().filter(|c| c.is_leader()).count();
        assert!(leaders <= 1, "{leaders} candidates believe they lead");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let leaders = candidates.iter().filter(|c| c.is_leader()).count();
    assert_eq!(leaders, 1);

    for c in &candidates {
        c.stop().await.unwrap();
    }
}

// ──────────────────────────────────────────────
// 3. Handlers
// ──────────────────────────────────────────────

#[tokio::test]
async fn handler_token_cancelled_on_stop() {
    let (_, svc) = service();
    let (token_tx, mut token_rx) = mpsc::channel(1);

    let candidate = svc.new_candidate("handlers", "host-1", Duration::from_secs(30), Vec::new());
    candidate.add_handlers([claim_handler(move |token| {
        let tx = token_tx.clone();
        async move {
            let _ = tx.send(token).await;
        }
    })]);

    candidate.start().await.unwrap();
    let token = tokio::time::timeout(Duration::from_secs(1), token_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!token.is_cancelled());

    candidate.stop().await.unwrap();
    assert!(token.is_cancelled());
}

// ──────────────────────────────────────────────
// 4. Store faults
// ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_ttl_is_raised_to_the_minimum() {
    let (_, svc) = service();
    let candidate = svc.new_candidate("tiny", "host-1", Duration::ZERO, Vec::new());
    assert_eq!(candidate.ttl(), MIN_TTL);

    candidate.start().await.unwrap();
    tokio::time::sleep(MIN_TTL * 2).await;
    assert!(candidate.is_leader());
    candidate.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_retries_after_a_lost_race() {
    let (kv, svc) = flaky_service();
    let candidate = svc.new_candidate("refresh", "host-1", Duration::from_millis(600), Vec::new());
    let mut errors = candidate.errors().unwrap();
    candidate.start().await.unwrap();
    assert!(candidate.is_leader());

    let before = kv.writes.load(Ordering::SeqCst);
    kv.failing_writes.store(2, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Two rejected refreshes and one that went through, all in one tick.
    assert_eq!(kv.failing_writes.load(Ordering::SeqCst), 0);
    assert!(kv.writes.load(Ordering::SeqCst) >= before + 3);
    assert!(errors.try_recv().is_err());
    assert!(candidate.is_leader());
    candidate.ensure_leader().await.unwrap();
    candidate.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_gives_up_after_repeated_losses() {
    let (kv, svc) = flaky_service();
    let candidate = svc.new_candidate("exhaust", "host-1", Duration::from_millis(600), Vec::new());
    let mut errors = candidate.errors().unwrap();
    candidate.start().await.unwrap();

    kv.failing_writes.store(3, Ordering::SeqCst);
    let err = tokio::time::timeout(Duration::from_secs(1), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(
        matches!(err, ElectionError::RefreshRetriesExhausted { attempts: 3, .. }),
        "{err:?}"
    );

    // The next tick refreshes normally.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(candidate.is_leader());
    candidate.ensure_leader().await.unwrap();
    candidate.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_watch_start_is_retried() {
    let (kv, svc) = flaky_service();
    kv.failing_watches.store(2, Ordering::SeqCst);
    let candidate = svc.new_candidate("watch", "host-1", Duration::from_millis(600), Vec::new());
    let mut errors = candidate.errors().unwrap();
    candidate.start().await.unwrap();

    for _ in 0..2 {
        let err = tokio::time::timeout(Duration::from_secs(1), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, ElectionError::WatchStart(_)), "{err:?}");
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while kv.watches.load(Ordering::SeqCst) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "watch never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(candidate.is_leader());
    candidate.stop().await.unwrap();
}
