use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{make_item, shared, Item, TestResult};
use crate::{DeleteOp, EventType, KvClient, PutOp, StorageError, WatchOp};

pub(super) async fn run_watch_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "watch",
        "subscribe_delivers_put_and_delete",
        subscribe_delivers_put_and_delete(factory).await,
    ));
    results.push(TestResult::from_result(
        "watch",
        "prefix_watch_ignores_siblings",
        prefix_watch_ignores_siblings(factory).await,
    ));
    results.push(TestResult::from_result(
        "watch",
        "until_returns_when_predicate_holds",
        until_returns_when_predicate_holds(factory).await,
    ));
    results.push(TestResult::from_result(
        "watch",
        "until_times_out_not_before_deadline",
        until_times_out_not_before_deadline(factory).await,
    ));
    results.push(TestResult::from_result(
        "watch",
        "second_start_fails_while_active",
        second_start_fails_while_active(factory).await,
    ));
    results.push(TestResult::from_result(
        "watch",
        "close_is_idempotent_and_restartable",
        close_is_idempotent_and_restartable(factory).await,
    ));
    results.push(TestResult::from_result(
        "watch",
        "handler_receives_events",
        handler_receives_events(factory).await,
    ));

    results
}

const EVENT_WAIT: Duration = Duration::from_secs(2);

async fn subscribe_delivers_put_and_delete<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let op = WatchOp::<Item>::key(client.clone(), "/t/w");
    let mut sub = op.subscribe().await.map_err(|e| format!("subscribe: {e}"))?;

    PutOp::create(client.clone(), "/t/w", make_item("w", 1))
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;
    DeleteOp::key(client, "/t/w")
        .exec()
        .await
        .map_err(|e| format!("delete: {e}"))?;

    let first = tokio::time::timeout(EVENT_WAIT, sub.next())
        .await
        .map_err(|_| "no put event".to_string())?
        .ok_or("stream ended")?;
    if first.event_type != EventType::Put || !first.is_create {
        return Err(format!("expected create event, got {first:?}"));
    }
    if first.value.as_ref().map(|v| v.count) != Some(1) {
        return Err("put event missing value".to_string());
    }

    let second = tokio::time::timeout(EVENT_WAIT, sub.next())
        .await
        .map_err(|_| "no delete event".to_string())?
        .ok_or("stream ended")?;
    if second.event_type != EventType::Delete || second.key != "/t/w" {
        return Err(format!("expected delete event, got {second:?}"));
    }
    if second.revision <= first.revision {
        return Err("events out of revision order".to_string());
    }
    op.close();
    Ok(())
}

async fn prefix_watch_ignores_siblings<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let op = WatchOp::<Item>::prefix(client.clone(), "/t/db-1");
    let mut sub = op.subscribe().await.map_err(|e| format!("subscribe: {e}"))?;

    PutOp::put(client.clone(), "/t/db-10/x", make_item("sibling", 0))
        .exec()
        .await
        .map_err(|e| format!("put sibling: {e}"))?;
    PutOp::put(client, "/t/db-1/x", make_item("own", 0))
        .exec()
        .await
        .map_err(|e| format!("put own: {e}"))?;

    let ev = tokio::time::timeout(EVENT_WAIT, sub.next())
        .await
        .map_err(|_| "no event".to_string())?
        .ok_or("stream ended")?;
    if ev.key != "/t/db-1/x" {
        return Err(format!("received event for {}", ev.key));
    }
    op.close();
    Ok(())
}

async fn until_returns_when_predicate_holds<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let writer = client.clone();
    let handle = tokio::spawn(async move {
        for i in 0..5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            PutOp::put(writer.clone(), "/t/counter", make_item("c", i))
                .exec()
                .await?;
        }
        Ok::<(), StorageError>(())
    });

    let op = WatchOp::<Item>::key(client, "/t/counter");
    op.until(EVENT_WAIT * 2, |ev| {
        ev.value.as_ref().map(|v| v.count) == Some(3)
    })
    .await
    .map_err(|e| format!("until: {e}"))?;

    handle
        .await
        .map_err(|e| format!("writer panicked: {e}"))?
        .map_err(|e| format!("writer: {e}"))?;
    Ok(())
}

async fn until_times_out_not_before_deadline<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let op = WatchOp::<Item>::key(client, "/t/never");
    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    match op.until(timeout, |_| true).await {
        Err(StorageError::WatchUntilTimedOut) => {}
        Err(e) => return Err(format!("expected WatchUntilTimedOut, got: {e}")),
        Ok(()) => return Err("until should time out".to_string()),
    }
    if started.elapsed() < timeout {
        return Err(format!("timed out early after {:?}", started.elapsed()));
    }
    Ok(())
}

async fn second_start_fails_while_active<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let op = WatchOp::<Item>::key(client, "/t/w");
    let _sub = op.subscribe().await.map_err(|e| format!("subscribe: {e}"))?;
    match op.subscribe().await {
        Err(StorageError::WatchAlreadyInProgress) => {}
        Err(e) => return Err(format!("expected WatchAlreadyInProgress, got: {e}")),
        Ok(_) => return Err("second subscribe should fail".to_string()),
    }
    op.close();
    Ok(())
}

async fn close_is_idempotent_and_restartable<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let op = WatchOp::<Item>::key(client, "/t/w");
    let mut sub = op.subscribe().await.map_err(|e| format!("subscribe: {e}"))?;
    op.close();
    op.close();

    let next = tokio::time::timeout(EVENT_WAIT, sub.next())
        .await
        .map_err(|_| "closed subscription did not end".to_string())?;
    if next.is_some() {
        return Err("closed subscription yielded an event".to_string());
    }

    let _again = op
        .subscribe()
        .await
        .map_err(|e| format!("restart after close: {e}"))?;
    op.close();
    Ok(())
}

async fn handler_receives_events<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let op = WatchOp::<Item>::prefix(client.clone(), "/t/h");
    op.watch(move |ev| {
        let _ = tx.send(ev.key);
    })
    .await
    .map_err(|e| format!("watch: {e}"))?;

    for i in 0..3 {
        PutOp::put(client.clone(), format!("/t/h/{i}"), make_item("h", i))
            .exec()
            .await
            .map_err(|e| format!("put {i}: {e}"))?;
    }

    let mut seen = Vec::new();
    while seen.len() < 3 {
        match tokio::time::timeout(EVENT_WAIT, rx.recv()).await {
            Ok(Some(key)) => seen.push(key),
            _ => return Err(format!("handler saw only {seen:?}")),
        }
    }
    if seen != ["/t/h/0", "/t/h/1", "/t/h/2"] {
        return Err(format!("events out of order: {seen:?}"));
    }
    op.close();
    Ok(())
}
