use async_trait::async_trait;

use crate::error::StorageError;
use crate::keys::normalize_prefix;
use crate::kv::{Compare, KvOp, OpResponse, TxnKey, TxnRequest};
use crate::record::Value;
use crate::traits::{SharedClient, TxnOperation};

enum Target {
    Key(String),
    Prefix(String),
}

/// Unconditionally delete a key or every key under a prefix.
pub struct DeleteOp {
    client: SharedClient,
    target: Target,
}

impl DeleteOp {
    pub fn key(client: SharedClient, key: impl Into<String>) -> Self {
        Self {
            client,
            target: Target::Key(key.into()),
        }
    }

    /// The prefix is normalized to end in `/`.
    pub fn prefix(client: SharedClient, prefix: impl AsRef<str>) -> Self {
        Self {
            client,
            target: Target::Prefix(normalize_prefix(prefix.as_ref())),
        }
    }

    /// Returns the number of keys deleted.
    pub async fn exec(self) -> Result<i64, StorageError> {
        let resp = self
            .client
            .txn(TxnRequest {
                compares: Vec::new(),
                success: vec![self.op()],
            })
            .await?;
        Ok(resp
            .responses
            .iter()
            .map(|r| match r {
                OpResponse::Delete { deleted } => *deleted,
                _ => 0,
            })
            .sum())
    }

    fn op(&self) -> KvOp {
        match &self.target {
            Target::Key(key) => KvOp::Delete { key: key.clone() },
            Target::Prefix(prefix) => KvOp::DeletePrefix {
                prefix: prefix.clone(),
            },
        }
    }
}

#[async_trait]
impl TxnOperation for DeleteOp {
    async fn ops(&self) -> Result<Vec<KvOp>, StorageError> {
        Ok(vec![self.op()])
    }

    fn keys(&self) -> Vec<TxnKey> {
        match &self.target {
            Target::Key(key) => vec![TxnKey::key("delete", key.clone())],
            Target::Prefix(prefix) => vec![TxnKey::prefix("delete", prefix.clone())],
        }
    }

    fn cmps(&self) -> Vec<Compare> {
        Vec::new()
    }
}

/// Delete a key only if the stored version matches the held value.
pub struct DeleteValueOp {
    client: SharedClient,
    key: String,
    version: i64,
}

impl DeleteValueOp {
    pub fn new<V: Value>(client: SharedClient, key: impl Into<String>, val: &V) -> Self {
        Self {
            client,
            key: key.into(),
            version: val.version(),
        }
    }

    /// Fails with `VersionMismatch` if the value changed or disappeared.
    pub async fn exec(self) -> Result<(), StorageError> {
        let resp = self
            .client
            .txn(TxnRequest {
                compares: self.cmps(),
                success: vec![KvOp::Delete {
                    key: self.key.clone(),
                }],
            })
            .await?;
        if !resp.succeeded {
            return Err(StorageError::VersionMismatch { key: self.key });
        }
        Ok(())
    }
}

#[async_trait]
impl TxnOperation for DeleteValueOp {
    async fn ops(&self) -> Result<Vec<KvOp>, StorageError> {
        Ok(vec![KvOp::Delete {
            key: self.key.clone(),
        }])
    }

    fn keys(&self) -> Vec<TxnKey> {
        vec![TxnKey::key("delete", self.key.clone())]
    }

    fn cmps(&self) -> Vec<Compare> {
        vec![Compare::version(self.key.clone(), self.version)]
    }
}
