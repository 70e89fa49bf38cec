use std::future::Future;

use serde::{Deserialize, Serialize};

use super::{make_item, shared, Item, TestResult};
use crate::{DeleteOp, GetOp, GetPrefixOp, KvClient, PutOp, StorageError};

pub(super) async fn run_error_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_nonexistent_returns_not_found",
        get_nonexistent_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_prefix_empty_for_nonexistent",
        get_prefix_empty_for_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "delete_nonexistent_reports_zero",
        delete_nonexistent_reports_zero(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "decode_into_wrong_type_fails",
        decode_into_wrong_type_fails(factory).await,
    ));

    results
}

async fn get_nonexistent_returns_not_found<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    match GetOp::<Item>::new(client, "/t/missing").exec().await {
        Err(StorageError::NotFound { key }) if key == "/t/missing" => Ok(()),
        Err(e) => Err(format!("expected NotFound, got: {e}")),
        Ok(v) => Err(format!("expected NotFound, got value {v:?}")),
    }
}

async fn get_prefix_empty_for_nonexistent<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let items: Vec<Item> = GetPrefixOp::new(client, "/t/nothing")
        .exec()
        .await
        .map_err(|e| format!("get prefix: {e}"))?;
    if !items.is_empty() {
        return Err(format!("expected empty result, got {} items", items.len()));
    }
    Ok(())
}

async fn delete_nonexistent_reports_zero<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let deleted = DeleteOp::key(client, "/t/missing")
        .exec()
        .await
        .map_err(|e| format!("delete: {e}"))?;
    if deleted != 0 {
        return Err(format!("expected 0 deleted, got {deleted}"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Other {
    #[serde(skip)]
    version: i64,
    required: Vec<u32>,
}

crate::impl_value!(Other);

async fn decode_into_wrong_type_fails<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::put(client.clone(), "/t/item", make_item("a", 1))
        .exec()
        .await
        .map_err(|e| format!("put: {e}"))?;
    match GetOp::<Other>::new(client, "/t/item").exec().await {
        Err(StorageError::Decode { key, .. }) if key == "/t/item" => Ok(()),
        Err(e) => Err(format!("expected Decode, got: {e}")),
        Ok(v) => Err(format!("decode should fail, got {v:?}")),
    }
}
