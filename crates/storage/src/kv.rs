//! Request and response types exchanged with a [`KvClient`](crate::KvClient).
//!
//! These mirror the primitives of an etcd-style store: per-key versions and
//! revisions, compare-guarded transactions, leases and revision-ordered
//! watch streams.

use tokio::sync::mpsc;

/// Identifier of a granted lease.
pub type LeaseId = i64;

/// A key-value pair as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    /// Revision at which the key was created.
    pub create_revision: i64,
    /// Revision of the last modification.
    pub mod_revision: i64,
    /// Per-key version: 1 on creation, incremented by every put, reset by a
    /// delete.
    pub version: i64,
    /// Lease the key is attached to, if any.
    pub lease: Option<LeaseId>,
}

/// Which keys a range request or watch covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRange {
    /// Exactly one key.
    Key(String),
    /// Every key starting with the prefix.
    Prefix(String),
    /// Keys in `[start, end)`.
    Range { start: String, end: String },
}

impl KeyRange {
    pub fn contains(&self, key: &str) -> bool {
        match self {
            KeyRange::Key(k) => k == key,
            KeyRange::Prefix(p) => key.starts_with(p.as_str()),
            KeyRange::Range { start, end } => key >= start.as_str() && key < end.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortTarget {
    Key,
    CreateRevision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascend,
    Descend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub range: KeyRange,
    /// Only report the number of matching keys.
    pub count_only: bool,
    /// Maximum number of keys to return. 0 means no limit.
    pub limit: usize,
    pub sort: Option<(SortTarget, SortOrder)>,
}

impl RangeRequest {
    pub fn new(range: KeyRange) -> Self {
        Self {
            range,
            count_only: false,
            limit: 0,
            sort: None,
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::new(KeyRange::Key(key.into()))
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::new(KeyRange::Prefix(prefix.into()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResponse {
    pub kvs: Vec<KeyValue>,
    /// Number of keys matching the request, regardless of `limit`.
    pub count: i64,
    pub revision: i64,
}

/// A compare predicate in a transaction. Only version comparisons are
/// needed: `version == 0` means "absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compare {
    pub key: String,
    pub version: i64,
}

impl Compare {
    pub fn version(key: impl Into<String>, version: i64) -> Self {
        Self {
            key: key.into(),
            version,
        }
    }
}

/// A key or prefix an operation will mutate, known before the operation is
/// materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnKey {
    pub kind: &'static str,
    pub key: String,
    pub prefix: bool,
}

impl TxnKey {
    pub fn key(kind: &'static str, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            prefix: false,
        }
    }

    pub fn prefix(kind: &'static str, prefix: impl Into<String>) -> Self {
        Self {
            kind,
            key: prefix.into(),
            prefix: true,
        }
    }

    /// Whether both address at least one common key.
    pub fn overlaps(&self, other: &TxnKey) -> bool {
        match (self.prefix, other.prefix) {
            (false, false) => self.key == other.key,
            (true, false) => other.key.starts_with(&self.key),
            (false, true) => self.key.starts_with(&other.key),
            (true, true) => self.key.starts_with(&other.key) || other.key.starts_with(&self.key),
        }
    }
}

/// A single operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put {
        key: String,
        value: Vec<u8>,
        lease: Option<LeaseId>,
    },
    Delete {
        key: String,
    },
    DeletePrefix {
        prefix: String,
    },
    Get(RangeRequest),
}

impl KvOp {
    /// The key this operation addresses. For prefix and range operations
    /// this is the start of the range.
    pub fn key(&self) -> &str {
        match self {
            KvOp::Put { key, .. } | KvOp::Delete { key } => key,
            KvOp::DeletePrefix { prefix } => prefix,
            KvOp::Get(req) => match &req.range {
                KeyRange::Key(k) | KeyRange::Prefix(k) => k,
                KeyRange::Range { start, .. } => start,
            },
        }
    }

    /// Short name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            KvOp::Put { .. } => "put",
            KvOp::Delete { .. } | KvOp::DeletePrefix { .. } => "delete",
            KvOp::Get(_) => "get",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnRequest {
    /// All compares must hold for `success` to be applied.
    pub compares: Vec<Compare>,
    pub success: Vec<KvOp>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResponse {
    Put,
    Delete { deleted: i64 },
    Get(RangeResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnResponse {
    pub succeeded: bool,
    pub revision: i64,
    /// One response per op in `success`, in order. Empty when the compares
    /// failed.
    pub responses: Vec<OpResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A change to a single key delivered on a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEvent {
    pub kind: EventKind,
    /// The new state for puts. For deletes, the key with an empty value and
    /// the delete's revision.
    pub kv: KeyValue,
    /// The state before the change, when there was one.
    pub prev_kv: Option<KeyValue>,
}

impl KvEvent {
    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Put && self.kv.create_revision == self.kv.mod_revision
    }

    pub fn is_modify(&self) -> bool {
        self.kind == EventKind::Put && self.kv.create_revision != self.kv.mod_revision
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub range: KeyRange,
}

/// A batch of events committed at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub revision: i64,
    pub events: Vec<KvEvent>,
}

/// Live watch stream. The stream ending means the server closed the watch.
pub type WatchStream = mpsc::Receiver<WatchResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range_contains() {
        let prefix = KeyRange::Prefix("/a/".into());
        assert!(prefix.contains("/a/b"));
        assert!(!prefix.contains("/ab"));

        let range = KeyRange::Range {
            start: "/p/02".into(),
            end: "/p/05".into(),
        };
        assert!(range.contains("/p/02"));
        assert!(range.contains("/p/04"));
        assert!(!range.contains("/p/05"));
    }
}
