use std::marker::PhantomData;

use crate::codec;
use crate::error::StorageError;
use crate::keys::normalize_prefix;
use crate::kv::{KeyRange, KeyValue, KvOp, OpResponse, RangeRequest, SortOrder, SortTarget, TxnRequest};
use crate::record::Value;
use crate::traits::SharedClient;

pub(crate) fn decode_kvs<V: Value>(kvs: &[KeyValue]) -> Result<Vec<V>, StorageError> {
    kvs.iter()
        .map(|kv| codec::decode(&kv.key, &kv.value, kv.version))
        .collect()
}

/// Fetch a single value by key. Fails with `NotFound` if absent.
pub struct GetOp<V> {
    client: SharedClient,
    key: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Value> GetOp<V> {
    pub fn new(client: SharedClient, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    pub async fn exec(self) -> Result<V, StorageError> {
        let resp = self.client.range(RangeRequest::key(self.key.clone())).await?;
        decode_kvs::<V>(&resp.kvs)?
            .into_iter()
            .next()
            .ok_or(StorageError::NotFound { key: self.key })
    }
}

/// Fetch several keys in one round trip. Missing keys are skipped, so the
/// result may be shorter than the input.
pub struct GetMultipleOp<V> {
    client: SharedClient,
    keys: Vec<String>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Value> GetMultipleOp<V> {
    pub fn new(client: SharedClient, keys: Vec<String>) -> Self {
        Self {
            client,
            keys,
            _marker: PhantomData,
        }
    }

    pub async fn exec(self) -> Result<Vec<V>, StorageError> {
        if self.keys.is_empty() {
            return Ok(Vec::new());
        }
        let success = self
            .keys
            .into_iter()
            .map(|k| KvOp::Get(RangeRequest::key(k)))
            .collect();
        let resp = self
            .client
            .txn(TxnRequest {
                compares: Vec::new(),
                success,
            })
            .await?;

        let mut vals = Vec::new();
        for r in resp.responses {
            if let OpResponse::Get(range) = r {
                vals.extend(decode_kvs::<V>(&range.kvs)?);
            }
        }
        Ok(vals)
    }
}

/// Fetch every value under a prefix, in key order unless sorted otherwise.
///
/// The prefix is normalized to end in `/`.
pub struct GetPrefixOp<V> {
    client: SharedClient,
    prefix: String,
    limit: usize,
    sort: Option<(SortTarget, SortOrder)>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Value> GetPrefixOp<V> {
    pub fn new(client: SharedClient, prefix: impl AsRef<str>) -> Self {
        Self {
            client,
            prefix: normalize_prefix(prefix.as_ref()),
            limit: 0,
            sort: None,
            _marker: PhantomData,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn sort_by(mut self, target: SortTarget, order: SortOrder) -> Self {
        self.sort = Some((target, order));
        self
    }

    pub async fn exec(self) -> Result<Vec<V>, StorageError> {
        let mut req = RangeRequest::new(KeyRange::Prefix(self.prefix));
        req.limit = self.limit;
        req.sort = self.sort;
        let resp = self.client.range(req).await?;
        decode_kvs(&resp.kvs)
    }
}

/// Fetch every value in `[start, end)`.
pub struct GetRangeOp<V> {
    client: SharedClient,
    start: String,
    end: String,
    limit: usize,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Value> GetRangeOp<V> {
    pub fn new(client: SharedClient, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            client,
            start: start.into(),
            end: end.into(),
            limit: 0,
            _marker: PhantomData,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub async fn exec(self) -> Result<Vec<V>, StorageError> {
        let mut req = RangeRequest::new(KeyRange::Range {
            start: self.start,
            end: self.end,
        });
        req.limit = self.limit;
        let resp = self.client.range(req).await?;
        decode_kvs(&resp.kvs)
    }
}

/// Check whether a key exists without transferring its value.
pub struct ExistsOp {
    client: SharedClient,
    key: String,
}

impl ExistsOp {
    pub fn new(client: SharedClient, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }

    pub async fn exec(self) -> Result<bool, StorageError> {
        let mut req = RangeRequest::key(self.key);
        req.count_only = true;
        let resp = self.client.range(req).await?;
        Ok(resp.count > 0)
    }
}
