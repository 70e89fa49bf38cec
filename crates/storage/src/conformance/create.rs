use std::future::Future;

use super::{make_item, shared, Item, TestResult};
use crate::{DeleteOp, ExistsOp, GetOp, GetPrefixOp, KvClient, PutOp, StorageError};

pub(super) async fn run_create_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "create",
        "create_stores_value_at_version_1",
        create_stores_value_at_version_1(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "create_fails_when_key_exists",
        create_fails_when_key_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "create_repeated_only_first_succeeds",
        create_repeated_only_first_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "create_after_delete_succeeds",
        create_after_delete_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "put_overwrites_unconditionally",
        put_overwrites_unconditionally(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "exists_reports_presence",
        exists_reports_presence(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "prefix_does_not_match_longer_ids",
        prefix_does_not_match_longer_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "create",
        "large_values_round_trip",
        large_values_round_trip(factory).await,
    ));

    results
}

// ── Create on an absent key ─────────────────────────────────────────────────

async fn create_stores_value_at_version_1<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/a", make_item("a", 1))
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;

    let got: Item = GetOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.name != "a" || got.count != 1 {
        return Err(format!("unexpected value: {got:?}"));
    }
    if got.version != 1 {
        return Err(format!("expected version 1, got {}", got.version));
    }
    Ok(())
}

// ── Create on an existing key ───────────────────────────────────────────────

async fn create_fails_when_key_exists<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/a", make_item("first", 1))
        .exec()
        .await
        .map_err(|e| format!("first create: {e}"))?;

    match PutOp::create(client.clone(), "/t/a", make_item("second", 2))
        .exec()
        .await
    {
        Err(StorageError::AlreadyExists { key }) if key == "/t/a" => {}
        Err(e) => return Err(format!("expected AlreadyExists, got: {e}")),
        Ok(()) => return Err("second create should fail".to_string()),
    }

    let got: Item = GetOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.name != "first" {
        return Err(format!("value was overwritten: {got:?}"));
    }
    Ok(())
}

async fn create_repeated_only_first_succeeds<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut successes = 0;
    for i in 0..5 {
        match PutOp::create(client.clone(), "/t/a", make_item("x", i))
            .exec()
            .await
        {
            Ok(()) => successes += 1,
            Err(StorageError::AlreadyExists { .. }) => {}
            Err(e) => return Err(format!("create {i}: {e}")),
        }
    }
    if successes != 1 {
        return Err(format!("expected exactly 1 success, got {successes}"));
    }
    Ok(())
}

async fn create_after_delete_succeeds<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/a", make_item("a", 1))
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;
    let deleted = DeleteOp::key(client.clone(), "/t/a")
        .exec()
        .await
        .map_err(|e| format!("delete: {e}"))?;
    if deleted != 1 {
        return Err(format!("expected 1 deleted, got {deleted}"));
    }
    PutOp::create(client.clone(), "/t/a", make_item("b", 2))
        .exec()
        .await
        .map_err(|e| format!("re-create: {e}"))?;

    let got: Item = GetOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.version != 1 {
        return Err(format!("version should reset to 1, got {}", got.version));
    }
    Ok(())
}

async fn put_overwrites_unconditionally<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    for i in 0..3 {
        PutOp::put(client.clone(), "/t/a", make_item("a", i))
            .exec()
            .await
            .map_err(|e| format!("put {i}: {e}"))?;
    }
    let got: Item = GetOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.count != 2 || got.version != 3 {
        return Err(format!("unexpected state: {got:?} v{}", got.version));
    }
    Ok(())
}

async fn exists_reports_presence<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let before = ExistsOp::new(client.clone(), "/t/a")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if before {
        return Err("key should not exist yet".to_string());
    }
    PutOp::put(client.clone(), "/t/a", make_item("a", 1))
        .exec()
        .await
        .map_err(|e| format!("put: {e}"))?;
    let after = ExistsOp::new(client, "/t/a")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if !after {
        return Err("key should exist".to_string());
    }
    Ok(())
}

// ── Prefix normalization ────────────────────────────────────────────────────

/// `db-1` must not see entries belonging to `db-10`.
async fn prefix_does_not_match_longer_ids<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    for key in ["/t/db-1/a", "/t/db-1/b", "/t/db-10/a"] {
        PutOp::put(client.clone(), key, make_item(key, 0))
            .exec()
            .await
            .map_err(|e| format!("put {key}: {e}"))?;
    }

    let items: Vec<Item> = GetPrefixOp::new(client.clone(), "/t/db-1")
        .exec()
        .await
        .map_err(|e| format!("get prefix: {e}"))?;
    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    if names != ["/t/db-1/a", "/t/db-1/b"] {
        return Err(format!("unexpected prefix result: {names:?}"));
    }

    let deleted = DeleteOp::prefix(client.clone(), "/t/db-1")
        .exec()
        .await
        .map_err(|e| format!("delete prefix: {e}"))?;
    if deleted != 2 {
        return Err(format!("expected 2 deleted, got {deleted}"));
    }
    let survivor = ExistsOp::new(client, "/t/db-10/a")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if !survivor {
        return Err("prefix delete removed a sibling entity".to_string());
    }
    Ok(())
}

async fn large_values_round_trip<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let big = make_item(&"z".repeat(10_000), 7);
    PutOp::create(client.clone(), "/t/big", big.clone())
        .exec()
        .await
        .map_err(|e| format!("create: {e}"))?;
    let got: Item = GetOp::new(client, "/t/big")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got.name != big.name || got.count != 7 {
        return Err("large value did not round-trip".to_string());
    }
    Ok(())
}
