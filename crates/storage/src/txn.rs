use tracing::debug;

use crate::error::StorageError;
use crate::kv::{TxnKey, TxnRequest};
use crate::traits::{SharedClient, TxnOperation};

/// A set of operations committed atomically.
///
/// The preconditions of every operation are ANDed. If any fails, nothing is
/// applied and `commit` returns `OperationConstraintViolated`.
pub struct Txn {
    client: SharedClient,
    ops: Vec<Box<dyn TxnOperation>>,
}

impl Txn {
    pub fn new(client: SharedClient) -> Self {
        Self {
            client,
            ops: Vec::new(),
        }
    }

    pub fn add(&mut self, op: impl TxnOperation + 'static) -> &mut Self {
        self.ops.push(Box::new(op));
        self
    }

    pub fn extend(&mut self, ops: Vec<Box<dyn TxnOperation>>) -> &mut Self {
        self.ops.extend(ops);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let keys: Vec<TxnKey> = self.ops.iter().flat_map(|op| op.keys()).collect();
        check_duplicate_keys(&keys)?;

        let mut compares = Vec::new();
        let mut success = Vec::new();
        for op in &self.ops {
            compares.extend(op.cmps());
            success.extend(op.ops().await?);
        }

        let n = success.len();
        let resp = self
            .client
            .txn(TxnRequest { compares, success })
            .await?;
        if !resp.succeeded {
            debug!(ops = n, "transaction precondition failed");
            return Err(StorageError::OperationConstraintViolated);
        }
        Ok(())
    }
}

/// Reject transactions that touch the same key more than once, including a
/// key that falls under a prefix deleted in the same transaction. The store
/// would either refuse them or apply them in an unspecified order.
fn check_duplicate_keys(keys: &[TxnKey]) -> Result<(), StorageError> {
    let mut dupes = vec![false; keys.len()];
    for (i, a) in keys.iter().enumerate() {
        for (j, b) in keys.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                dupes[i] = true;
                dupes[j] = true;
            }
        }
    }

    let mut offending: Vec<&TxnKey> = keys
        .iter()
        .zip(&dupes)
        .filter_map(|(k, dupe)| dupe.then_some(k))
        .collect();
    if offending.is_empty() {
        return Ok(());
    }
    offending.sort_by(|a, b| a.key.cmp(&b.key));

    let ops = offending
        .into_iter()
        .map(|k| format!("\t{} {}", k.kind, k.key))
        .collect();
    Err(StorageError::DuplicateKeysInTransaction { ops })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_listed_in_order() {
        let keys = vec![
            TxnKey::key("put", "b"),
            TxnKey::key("put", "a"),
            TxnKey::key("delete", "a"),
            TxnKey::key("delete", "c"),
        ];
        let err = check_duplicate_keys(&keys).unwrap_err();
        match err {
            StorageError::DuplicateKeysInTransaction { ops } => {
                assert_eq!(ops, vec!["\tput a".to_string(), "\tdelete a".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn key_under_deleted_prefix_is_a_duplicate() {
        let keys = vec![
            TxnKey::prefix("delete", "/a/"),
            TxnKey::key("put", "/a/x"),
            TxnKey::key("put", "/ab"),
        ];
        match check_duplicate_keys(&keys).unwrap_err() {
            StorageError::DuplicateKeysInTransaction { ops } => {
                assert_eq!(ops, vec!["\tdelete /a/".to_string(), "\tput /a/x".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nested_prefixes_overlap() {
        let keys = vec![
            TxnKey::prefix("delete", "/a/b/"),
            TxnKey::prefix("delete", "/a/"),
        ];
        assert!(check_duplicate_keys(&keys).is_err());
    }

    #[test]
    fn distinct_keys_pass() {
        let keys = vec![
            TxnKey::key("delete", "a"),
            TxnKey::key("delete", "b"),
            TxnKey::prefix("delete", "/c/"),
            TxnKey::key("put", "/cd"),
        ];
        assert!(check_duplicate_keys(&keys).is_ok());
    }
}
