use std::future::Future;

use super::{make_item, shared, Item, TestResult};
use crate::{GetOp, GetPrefixOp, KvClient, PutOp, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_exactly_one_wins",
        concurrent_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_creates_exactly_one_wins",
        concurrent_creates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_creates_different_keys_all_succeed",
        concurrent_creates_different_keys_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_final_state_consistent",
        concurrent_updates_final_state_consistent(factory).await,
    ));

    results
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks read the same value and all try to update it from that version.
/// Exactly one succeeds; the rest must get VersionMismatch.
async fn concurrent_updates_exactly_one_wins<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/race", make_item("race", 0))
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;
    let base: Item = GetOp::new(client.clone(), "/t/race")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;

    let mut handles = Vec::new();
    for i in 0..N {
        let c = client.clone();
        let mut val = base.clone();
        val.count = i as i64 + 1;
        handles.push(tokio::spawn(async move {
            match PutOp::update(c, "/t/race", val).exec().await {
                Ok(()) => Ok(true),
                Err(StorageError::VersionMismatch { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, losers) = tally(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Concurrent create: exactly one wins ─────────────────────────────────────

async fn concurrent_creates_exactly_one_wins<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut handles = Vec::new();
    for i in 0..N {
        let c = client.clone();
        handles.push(tokio::spawn(async move {
            match PutOp::create(c, "/t/once", make_item("once", i as i64))
                .exec()
                .await
            {
                Ok(()) => Ok(true),
                Err(StorageError::AlreadyExists { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, _) = tally(handles).await?;
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Independent keys do not interfere ───────────────────────────────────────

async fn concurrent_creates_different_keys_all_succeed<C, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut handles = Vec::new();
    for i in 0..N {
        let c = client.clone();
        handles.push(tokio::spawn(async move {
            PutOp::create(c, format!("/t/many/{i:02}"), make_item("m", i as i64))
                .exec()
                .await
                .map(|_| true)
        }));
    }

    let (winners, _) = tally(handles).await?;
    if winners != N {
        return Err(format!("expected {N} successes, got {winners}"));
    }
    let items: Vec<Item> = GetPrefixOp::new(client, "/t/many")
        .exec()
        .await
        .map_err(|e| format!("get prefix: {e}"))?;
    if items.len() != N {
        return Err(format!("expected {N} stored items, got {}", items.len()));
    }
    Ok(())
}

// ── Read-modify-write loops converge ────────────────────────────────────────

/// N tasks each increment a counter with a read/update retry loop. The final
/// count must equal N, proving no increment was lost.
async fn concurrent_updates_final_state_consistent<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/counter", make_item("counter", 0))
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let c = client.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let mut item: Item = GetOp::new(c.clone(), "/t/counter").exec().await?;
                item.count += 1;
                match PutOp::update(c.clone(), "/t/counter", item).exec().await {
                    Ok(()) => return Ok(true),
                    Err(StorageError::VersionMismatch { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
        }));
    }
    tally(handles).await?;

    let item: Item = GetOp::new(client, "/t/counter")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if item.count != N as i64 {
        return Err(format!("expected count {N}, got {}", item.count));
    }
    if item.version != N as i64 + 1 {
        return Err(format!("expected version {}, got {}", N + 1, item.version));
    }
    Ok(())
}

async fn tally(
    handles: Vec<tokio::task::JoinHandle<Result<bool, StorageError>>>,
) -> Result<(usize, usize), String> {
    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }
    Ok((winners, losers))
}
