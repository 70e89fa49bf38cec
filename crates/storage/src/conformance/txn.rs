use std::future::Future;
use std::time::Duration;

use super::{make_item, shared, Item, TestResult};
use crate::{
    DeleteOp, ExistsOp, GetMultipleOp, GetOp, GetPrefixOp, KvClient, PutOp, StorageError, Txn,
};

pub(super) async fn run_txn_tests<C, F, Fut>(factory: &F) -> Vec<TestResult>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "txn",
        "txn_applies_all_ops",
        txn_applies_all_ops(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "failed_precondition_applies_nothing",
        failed_precondition_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "duplicate_keys_rejected_before_write",
        duplicate_keys_rejected_before_write(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "key_under_deleted_prefix_rejected",
        key_under_deleted_prefix_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "mixed_create_update_delete",
        mixed_create_update_delete(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "empty_txn_is_noop",
        empty_txn_is_noop(factory).await,
    ));
    results.push(TestResult::from_result(
        "txn",
        "get_multiple_skips_missing",
        get_multiple_skips_missing(factory).await,
    ));

    results
}

// ── All-or-nothing ──────────────────────────────────────────────────────────

async fn txn_applies_all_ops<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut txn = Txn::new(client.clone());
    for i in 0..4 {
        txn.add(PutOp::create(
            client.clone(),
            format!("/t/items/{i}"),
            make_item("x", i),
        ));
    }
    txn.commit().await.map_err(|e| format!("commit: {e}"))?;

    let items: Vec<Item> = GetPrefixOp::new(client, "/t/items")
        .exec()
        .await
        .map_err(|e| format!("get prefix: {e}"))?;
    if items.len() != 4 {
        return Err(format!("expected 4 items, got {}", items.len()));
    }
    Ok(())
}

async fn failed_precondition_applies_nothing<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/existing", make_item("e", 0))
        .exec()
        .await
        .map_err(|e| format!("seed: {e}"))?;

    let mut txn = Txn::new(client.clone());
    txn.add(PutOp::create(client.clone(), "/t/new", make_item("n", 0)));
    txn.add(PutOp::create(client.clone(), "/t/existing", make_item("e", 1)));
    match txn.commit().await {
        Err(StorageError::OperationConstraintViolated) => {}
        Err(e) => return Err(format!("expected OperationConstraintViolated, got: {e}")),
        Ok(()) => return Err("commit should fail".to_string()),
    }

    let new_exists = ExistsOp::new(client, "/t/new")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if new_exists {
        return Err("partial transaction was applied".to_string());
    }
    Ok(())
}

async fn duplicate_keys_rejected_before_write<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    let mut txn = Txn::new(client.clone());
    txn.add(PutOp::put(client.clone(), "/t/other", make_item("o", 0)));
    txn.add(PutOp::put(client.clone(), "/t/dup", make_item("a", 0)));
    txn.add(DeleteOp::key(client.clone(), "/t/dup"));
    match txn.commit().await {
        Err(StorageError::DuplicateKeysInTransaction { ops }) => {
            if !ops.iter().any(|o| o.contains("put /t/dup"))
                || !ops.iter().any(|o| o.contains("delete /t/dup"))
            {
                return Err(format!("error does not list offending ops: {ops:?}"));
            }
        }
        Err(e) => return Err(format!("expected DuplicateKeysInTransaction, got: {e}")),
        Ok(()) => return Err("duplicate keys should be rejected".to_string()),
    }

    let other = ExistsOp::new(client, "/t/other")
        .exec()
        .await
        .map_err(|e| format!("exists: {e}"))?;
    if other {
        return Err("rejected transaction wrote a key".to_string());
    }
    Ok(())
}

async fn key_under_deleted_prefix_rejected<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::put(client.clone(), "/t/tree/x", make_item("x", 0))
        .exec()
        .await
        .map_err(|e| format!("seed: {e}"))?;

    let mut txn = Txn::new(client.clone());
    txn.add(DeleteOp::prefix(client.clone(), "/t/tree"));
    txn.add(
        PutOp::put(client.clone(), "/t/tree/x", make_item("y", 1)).with_ttl(Duration::from_secs(30)),
    );
    match txn.commit().await {
        Err(StorageError::DuplicateKeysInTransaction { ops }) => {
            if !ops.iter().any(|o| o.contains("delete /t/tree/"))
                || !ops.iter().any(|o| o.contains("put /t/tree/x"))
            {
                return Err(format!("error does not list offending ops: {ops:?}"));
            }
        }
        Err(e) => return Err(format!("expected DuplicateKeysInTransaction, got: {e}")),
        Ok(()) => return Err("overlapping prefix delete should be rejected".to_string()),
    }

    let kept: Item = GetOp::new(client, "/t/tree/x")
        .exec()
        .await
        .map_err(|e| format!("get: {e}"))?;
    if kept.name != "x" {
        return Err("rejected transaction changed the key".to_string());
    }
    Ok(())
}

async fn mixed_create_update_delete<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    PutOp::create(client.clone(), "/t/upd", make_item("u", 0))
        .exec()
        .await
        .map_err(|e| format!("seed upd: {e}"))?;
    PutOp::create(client.clone(), "/t/del", make_item("d", 0))
        .exec()
        .await
        .map_err(|e| format!("seed del: {e}"))?;
    let mut upd: Item = GetOp::new(client.clone(), "/t/upd")
        .exec()
        .await
        .map_err(|e| format!("get upd: {e}"))?;
    upd.count = 5;

    let mut txn = Txn::new(client.clone());
    txn.add(PutOp::create(client.clone(), "/t/new", make_item("n", 0)))
        .add(PutOp::update(client.clone(), "/t/upd", upd))
        .add(DeleteOp::key(client.clone(), "/t/del"));
    txn.commit().await.map_err(|e| format!("commit: {e}"))?;

    let got: Item = GetOp::new(client.clone(), "/t/upd")
        .exec()
        .await
        .map_err(|e| format!("get upd: {e}"))?;
    if got.count != 5 {
        return Err("update not applied".to_string());
    }
    let del = ExistsOp::new(client.clone(), "/t/del")
        .exec()
        .await
        .map_err(|e| format!("exists del: {e}"))?;
    let new = ExistsOp::new(client, "/t/new")
        .exec()
        .await
        .map_err(|e| format!("exists new: {e}"))?;
    if del || !new {
        return Err(format!("unexpected state: del={del} new={new}"));
    }
    Ok(())
}

async fn empty_txn_is_noop<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    Txn::new(client)
        .commit()
        .await
        .map_err(|e| format!("empty commit: {e}"))
}

async fn get_multiple_skips_missing<C, F, Fut>(factory: &F) -> Result<(), String>
where
    C: KvClient,
    F: Fn() -> Fut,
    Fut: Future<Output = C>,
{
    let client = shared(factory).await;
    for key in ["/t/m/1", "/t/m/3"] {
        PutOp::put(client.clone(), key, make_item(key, 0))
            .exec()
            .await
            .map_err(|e| format!("put {key}: {e}"))?;
    }
    let keys = vec![
        "/t/m/1".to_string(),
        "/t/m/2".to_string(),
        "/t/m/3".to_string(),
    ];
    let items: Vec<Item> = GetMultipleOp::new(client, keys)
        .exec()
        .await
        .map_err(|e| format!("get multiple: {e}"))?;
    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    if names != ["/t/m/1", "/t/m/3"] {
        return Err(format!("unexpected items: {names:?}"));
    }
    Ok(())
}
