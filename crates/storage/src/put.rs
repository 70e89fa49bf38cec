use std::time::Duration;

use async_trait::async_trait;

use crate::codec;
use crate::error::StorageError;
use crate::kv::{Compare, KvOp, TxnKey, TxnRequest};
use crate::record::Value;
use crate::traits::{SharedClient, TxnOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PutMode {
    /// Unconditional write.
    Put,
    /// Write only if the key is absent.
    Create,
    /// Write only if the stored version equals the value's version.
    Update,
}

/// Store a value, optionally attached to a fresh lease.
///
/// Built with [`PutOp::put`], [`PutOp::create`] or [`PutOp::update`]; the
/// constructor decides which precondition guards the write.
pub struct PutOp<V> {
    client: SharedClient,
    key: String,
    val: V,
    ttl: Option<Duration>,
    mode: PutMode,
}

impl<V: Value> PutOp<V> {
    /// Store without any version constraint.
    pub fn put(client: SharedClient, key: impl Into<String>, val: V) -> Self {
        Self::with_mode(client, key.into(), val, PutMode::Put)
    }

    /// Store only if the key does not exist yet. `exec` fails with
    /// `AlreadyExists` otherwise.
    pub fn create(client: SharedClient, key: impl Into<String>, val: V) -> Self {
        Self::with_mode(client, key.into(), val, PutMode::Create)
    }

    /// Store only if the stored version matches `val.version()`. `exec`
    /// fails with `VersionMismatch` otherwise.
    pub fn update(client: SharedClient, key: impl Into<String>, val: V) -> Self {
        Self::with_mode(client, key.into(), val, PutMode::Update)
    }

    fn with_mode(client: SharedClient, key: String, val: V, mode: PutMode) -> Self {
        Self {
            client,
            key,
            val,
            ttl: None,
            mode,
        }
    }

    /// Attach the key to a lease with the given TTL. The lease is granted
    /// when the op is materialized.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn exec(self) -> Result<(), StorageError> {
        let resp = self
            .client
            .txn(TxnRequest {
                compares: self.cmps(),
                success: self.ops().await?,
            })
            .await?;
        if resp.succeeded {
            return Ok(());
        }
        match self.mode {
            PutMode::Create => Err(StorageError::AlreadyExists { key: self.key }),
            PutMode::Update => Err(StorageError::VersionMismatch { key: self.key }),
            PutMode::Put => Err(StorageError::OperationConstraintViolated),
        }
    }
}

#[async_trait]
impl<V: Value> TxnOperation for PutOp<V> {
    async fn ops(&self) -> Result<Vec<KvOp>, StorageError> {
        let lease = match self.ttl {
            Some(ttl) => Some(self.client.grant_lease(ttl).await.map_err(|e| {
                StorageError::Backend(format!("failed to grant lease for {}: {e}", self.key))
            })?),
            None => None,
        };
        let value = codec::encode(&self.key, &self.val)?;
        Ok(vec![KvOp::Put {
            key: self.key.clone(),
            value,
            lease,
        }])
    }

    fn keys(&self) -> Vec<TxnKey> {
        vec![TxnKey::key("put", self.key.clone())]
    }

    fn cmps(&self) -> Vec<Compare> {
        match self.mode {
            PutMode::Put => Vec::new(),
            PutMode::Create => vec![Compare::version(self.key.clone(), 0)],
            PutMode::Update => vec![Compare::version(self.key.clone(), self.val.version())],
        }
    }
}
