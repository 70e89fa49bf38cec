use std::future::Future;
use std::time::Duration;

use super::{make_item, shared, Item, TestResult};
use crate::{ExistsOp, GetOp, KvClient, PutOp};

const SHORT_TTL: Duration = Duration::from_millis(300);

pub(super) async fn run_lease_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "lease",
        "leased_key_expires",
        leased_key_expires(factory).await,
    ));
    results.push(TestResult::from_result(
        "lease",
        "reput_with_new_lease_keeps_key",
        reput_with_new_lease_keeps_key(factory).await,
    ));
    results.push(TestResult::from_result(
        "lease",
        "unleased_put_detaches_lease",
        unleased_put_detaches_lease(factory).await,
    ));

    results
}

async fn leased_key_expires<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/leased", make_item("l", 0))
        .with_ttl(SHORT_TTL)
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;
    let present = ExistsOp::new(client.clone(), "/t/leased")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if !present {
        return Err("key missing right after create".to_string());
    }

    tokio::time::sleep(SHORT_TTL * 3).await;
    let present = ExistsOp::new(client, "/t/leased")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if present {
        return Err("key survived its lease".to_string());
    }
    Ok(())
}

async fn reput_with_new_lease_keeps_key<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/leased", make_item("l", 0))
        .with_ttl(SHORT_TTL)
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;

    let item: Item = GetOp::new(client.clone(), "/t/leased")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    PutOp::update(client.clone(), "/t/leased", item)
        .with_ttl(SHORT_TTL * 10)
        .exec()
        .await
        .map_err(|e| format!("refresh: {e}"))?;

    tokio::time::sleep(SHORT_TTL * 2).await;
    let present = ExistsOp::new(client, "/t/leased")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if !present {
        return Err("refreshed key expired with its old lease".to_string());
    }
    Ok(())
}

async fn unleased_put_detaches_lease<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::put(client.clone(), "/t/k", make_item("l", 0))
        .with_ttl(SHORT_TTL)
        .exec()
        .await
        .map_err(|e| format!("leased put: {e}"))?;
    PutOp::put(client.clone(), "/t/k", make_item("l", 1))
        .exec()
        .await
        .map_err(|e| format!("plain put: {e}"))?;

    tokio::time::sleep(SHORT_TTL * 2).await;
    let present = ExistsOp::new(client, "/t/k")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if !present {
        return Err("key expired after lease was replaced".to_string());
    }
    Ok(())
}
