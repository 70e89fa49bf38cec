use std::future::Future;

use super::{make_item, shared, Item, TestResult};
use crate::{DeleteValueOp, GetOp, KvClient, PutOp, StorageError, Value};

pub(super) async fn run_update_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "update",
        "update_with_current_version_succeeds",
        update_with_current_version_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "version_increments_sequentially",
        version_increments_sequentially(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "update_with_stale_version_fails",
        update_with_stale_version_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "mismatch_does_not_change_value",
        mismatch_does_not_change_value(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "update_of_absent_key_fails",
        update_of_absent_key_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "delete_value_with_stale_version_fails",
        delete_value_with_stale_version_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "update",
        "delete_value_with_current_version_succeeds",
        delete_value_with_current_version_succeeds(factory).await,
    ));

    results
}

async fn seed(client: &crate::SharedClient, key: &str) -> Result<Item, String> {
    PutOp::create(client.clone(), key, make_item("seed", 0))
        .exec()
        .await
        .map_err(|e| format!("seed create: {e}"))?;
    GetOp::new(client.clone(), key)
        .exec()
        .await
        .map_err(|e| format!("seed get: {e}"))
}

// ── Successful updates ──────────────────────────────────────────────────────

async fn update_with_current_version_succeeds<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut item = seed(&client, "/t/a").await?;
    item.count = 10;
    PutOp::update(client.clone(), "/t/a", item)
        .exec()
        .await
        .map_err(|e| format!("update: {e}"))?;

    let got: Item = GetOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.count != 10 {
        return Err(format!("update not applied: {got:?}"));
    }
    if got.version() != 2 {
        return Err(format!("expected version 2, got {}", got.version()));
    }
    Ok(())
}

async fn version_increments_sequentially<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut item = seed(&client, "/t/a").await?;
    for i in 1..=5 {
        item.count = i;
        PutOp::update(client.clone(), "/t/a", item.clone())
            .exec()
            .await
            .map_err(|e| format!("update {i}: {e}"))?;
        item = GetOp::new(client.clone(), "/t/a")
            .exec()
            .await
            .map_err(|e| format!("get {i}: {e}"))?;
        if item.version() != i + 1 {
            return Err(format!(
                "after update {i}: expected version {}, got {}",
                i + 1,
                item.version()
            ));
        }
    }
    Ok(())
}

// ── Version mismatches ──────────────────────────────────────────────────────

async fn update_with_stale_version_fails<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let stale = seed(&client, "/t/a").await?;

    let mut fresh = stale.clone();
    fresh.count = 1;
    PutOp::update(client.clone(), "/t/a", fresh)
        .exec()
        .await
        .map_err(|e| format!("first update: {e}"))?;

    match PutOp::update(client, "/t/a", stale).exec().await {
        Err(StorageError::VersionMismatch { key }) if key == "/t/a" => Ok(()),
        Err(e) => Err(format!("expected VersionMismatch, got: {e}")),
        Ok(()) => Err("stale update should fail".to_string()),
    }
}

async fn mismatch_does_not_change_value<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut item = seed(&client, "/t/a").await?;
    item.set_version(item.version() + 3);
    item.count = 99;
    let _ = PutOp::update(client.clone(), "/t/a", item).exec().await;

    let got: Item = GetOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.count != 0 || got.version() != 1 {
        return Err(format!("value changed after mismatch: {got:?}"));
    }
    Ok(())
}

async fn update_of_absent_key_fails<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut item = make_item("ghost", 0);
    item.set_version(1);
    match PutOp::update(client, "/t/ghost", item).exec().await {
        Err(StorageError::VersionMismatch { .. }) => Ok(()),
        Err(e) => Err(format!("expected VersionMismatch, got: {e}")),
        Ok(()) => Err("update of absent key should fail".to_string()),
    }
}

// ── Versioned deletes ───────────────────────────────────────────────────────

async fn delete_value_with_stale_version_fails<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let stale = seed(&client, "/t/a").await?;
    PutOp::update(client.clone(), "/t/a", stale.clone())
        .exec()
        .await
        .map_err(|e| format!("update: {e}"))?;

    match DeleteValueOp::new(client.clone(), "/t/a", &stale).exec().await {
        Err(StorageError::VersionMismatch { .. }) => {}
        Err(e) => return Err(format!("expected VersionMismatch, got: {e}")),
        Ok(()) => return Err("stale delete should fail".to_string()),
    }
    GetOp::<Item>::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("value should survive stale delete: {e}"))?;
    Ok(())
}

async fn delete_value_with_current_version_succeeds<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let item = seed(&client, "/t/a").await?;
    DeleteValueOp::new(client.clone(), "/t/a", &item)
        .exec()
        .await
        .map_err(|e| format!("delete: {e}"))?;
    match GetOp::<Item>::new(client, "/t/a").exec().await {
        Err(StorageError::NotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected NotFound, got: {e}")),
        Ok(v) => Err(format!("value still present: {v:?}")),
    }
}
