//! In-process [`KvClient`] with etcd semantics.
//!
//! `MemoryKv` keeps a single ordered index guarded by an async mutex. Every
//! mutating transaction bumps a global revision; each key tracks its
//! create/mod revisions and a per-key version. Leases carry a deadline and
//! the keys currently attached to them. Expired leases are swept lazily at
//! the start of every call and by a background reaper so that watchers see
//! the resulting deletes even when the store is otherwise idle.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::error::StorageError;
use crate::keys::prefix_range_end;
use crate::kv::{
    EventKind, KeyRange, KeyValue, KvEvent, KvOp, LeaseId, OpResponse, RangeRequest,
    RangeResponse, SortOrder, SortTarget, TxnRequest, TxnResponse, WatchRequest, WatchResponse,
    WatchStream,
};
use crate::traits::KvClient;

/// Buffered responses per watcher before it is considered stuck and closed.
const WATCH_CHANNEL_CAPACITY: usize = 256;

/// How often the background reaper sweeps expired leases.
const REAP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    create_revision: i64,
    mod_revision: i64,
    version: i64,
    lease: Option<LeaseId>,
}

impl Entry {
    fn to_kv(&self, key: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: self.value.clone(),
            create_revision: self.create_revision,
            mod_revision: self.mod_revision,
            version: self.version,
            lease: self.lease,
        }
    }
}

#[derive(Debug)]
struct Lease {
    deadline: Instant,
    keys: BTreeSet<String>,
}

struct Watcher {
    range: KeyRange,
    tx: mpsc::Sender<WatchResponse>,
}

#[derive(Default)]
struct State {
    data: BTreeMap<String, Entry>,
    revision: i64,
    leases: HashMap<LeaseId, Lease>,
    next_lease_id: LeaseId,
    watchers: Vec<Watcher>,
}

impl State {
    fn version_of(&self, key: &str) -> i64 {
        self.data.get(key).map(|e| e.version).unwrap_or(0)
    }

    fn range(&self, req: &RangeRequest) -> RangeResponse {
        let mut kvs: Vec<KeyValue> = match &req.range {
            KeyRange::Key(k) => self.data.get(k).map(|e| e.to_kv(k)).into_iter().collect(),
            KeyRange::Prefix(p) => {
                let end = prefix_range_end(p);
                self.data
                    .range(p.clone()..end)
                    .map(|(k, e)| e.to_kv(k))
                    .collect()
            }
            KeyRange::Range { start, end } => {
                if start >= end {
                    Vec::new()
                } else {
                    self.data
                        .range(start.clone()..end.clone())
                        .map(|(k, e)| e.to_kv(k))
                        .collect()
                }
            }
        };
        let count = kvs.len() as i64;

        if let Some((target, order)) = req.sort {
            match target {
                SortTarget::Key => {}
                SortTarget::CreateRevision => kvs.sort_by_key(|kv| kv.create_revision),
            }
            if order == SortOrder::Descend {
                kvs.reverse();
            }
        }
        if req.limit > 0 {
            kvs.truncate(req.limit);
        }
        if req.count_only {
            kvs.clear();
        }

        RangeResponse {
            kvs,
            count,
            revision: self.revision,
        }
    }

    fn put(&mut self, key: &str, value: Vec<u8>, lease: Option<LeaseId>, rev: i64) -> KvEvent {
        let prev = self.data.get(key).cloned();
        if let Some(old_lease) = prev.as_ref().and_then(|p| p.lease) {
            if let Some(l) = self.leases.get_mut(&old_lease) {
                l.keys.remove(key);
            }
        }
        if let Some(id) = lease {
            if let Some(l) = self.leases.get_mut(&id) {
                l.keys.insert(key.to_string());
            }
        }

        let entry = Entry {
            value,
            create_revision: prev.as_ref().map(|p| p.create_revision).unwrap_or(rev),
            mod_revision: rev,
            version: prev.as_ref().map(|p| p.version + 1).unwrap_or(1),
            lease,
        };
        let kv = entry.to_kv(key);
        self.data.insert(key.to_string(), entry);

        KvEvent {
            kind: EventKind::Put,
            kv,
            prev_kv: prev.map(|p| p.to_kv(key)),
        }
    }

    fn delete(&mut self, key: &str, rev: i64) -> Option<KvEvent> {
        let prev = self.data.remove(key)?;
        if let Some(id) = prev.lease {
            if let Some(l) = self.leases.get_mut(&id) {
                l.keys.remove(key);
            }
        }
        Some(KvEvent {
            kind: EventKind::Delete,
            kv: KeyValue {
                key: key.to_string(),
                value: Vec::new(),
                create_revision: 0,
                mod_revision: rev,
                version: 0,
                lease: None,
            },
            prev_kv: Some(prev.to_kv(key)),
        })
    }

    fn delete_prefix(&mut self, prefix: &str, rev: i64) -> Vec<KvEvent> {
        let end = prefix_range_end(prefix);
        let keys: Vec<String> = self
            .data
            .range(prefix.to_string()..end)
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter_map(|k| self.delete(k, rev)).collect()
    }

    /// Delete every key attached to a lease past its deadline. Each lease
    /// expires at its own revision, like a revoke.
    fn expire(&mut self, now: Instant) {
        let mut expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, l)| l.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in expired {
            let Some(lease) = self.leases.remove(&id) else {
                continue;
            };
            let live: Vec<&String> = lease
                .keys
                .iter()
                .filter(|k| self.data.get(k.as_str()).and_then(|e| e.lease) == Some(id))
                .collect();
            if live.is_empty() {
                continue;
            }
            self.revision += 1;
            let rev = self.revision;
            let events: Vec<KvEvent> = live.iter().filter_map(|k| self.delete(k, rev)).collect();
            debug!(lease_id = id, keys = events.len(), "lease expired");
            self.notify(rev, events);
        }
    }

    fn notify(&mut self, revision: i64, events: Vec<KvEvent>) {
        if events.is_empty() {
            return;
        }
        self.watchers.retain(|w| {
            let matching: Vec<KvEvent> = events
                .iter()
                .filter(|e| w.range.contains(&e.kv.key))
                .cloned()
                .collect();
            if matching.is_empty() {
                return !w.tx.is_closed();
            }
            w.tx.try_send(WatchResponse {
                revision,
                events: matching,
            })
            .is_ok()
        });
    }

    fn check_duplicates(&self, ops: &[KvOp]) -> Result<(), StorageError> {
        let mut keys = HashSet::new();
        let mut prefixes = Vec::new();
        for op in ops {
            match op {
                KvOp::Put { key, .. } | KvOp::Delete { key } => {
                    if !keys.insert(key.as_str()) {
                        return Err(duplicate_key_error());
                    }
                }
                KvOp::DeletePrefix { prefix } => prefixes.push(prefix.as_str()),
                KvOp::Get(_) => {}
            }
        }
        for p in &prefixes {
            if keys.iter().any(|k| k.starts_with(p)) {
                return Err(duplicate_key_error());
            }
        }
        Ok(())
    }
}

fn duplicate_key_error() -> StorageError {
    StorageError::Backend("duplicate key given in txn request".to_string())
}

/// In-memory key-value store implementing [`KvClient`].
///
/// Cloning shares the same underlying store.
#[derive(Clone)]
pub struct MemoryKv {
    state: Arc<Mutex<State>>,
}

impl MemoryKv {
    /// Create an empty store. When called inside a Tokio runtime a reaper
    /// task is spawned; it exits once every handle to the store is dropped.
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(State {
            next_lease_id: 1,
            ..Default::default()
        }));
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(reap(Arc::downgrade(&state)));
        }
        Self { state }
    }

    /// The revision of the most recent mutation.
    pub async fn revision(&self) -> i64 {
        self.state.lock().await.revision
    }

    /// Terminate every open watch stream, as a store does when it compacts
    /// or restarts.
    pub async fn close_watches(&self) {
        let mut state = self.state.lock().await;
        let n = state.watchers.len();
        state.watchers.clear();
        debug!(watchers = n, "closed all watches");
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

async fn reap(state: Weak<Mutex<State>>) {
    let mut ticker = tokio::time::interval(REAP_INTERVAL);
    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            return;
        };
        state.lock().await.expire(Instant::now());
    }
}

#[async_trait]
impl KvClient for MemoryKv {
    async fn range(&self, req: RangeRequest) -> Result<RangeResponse, StorageError> {
        let mut state = self.state.lock().await;
        state.expire(Instant::now());
        Ok(state.range(&req))
    }

    async fn txn(&self, req: TxnRequest) -> Result<TxnResponse, StorageError> {
        let mut state = self.state.lock().await;
        state.expire(Instant::now());
        state.check_duplicates(&req.success)?;

        let holds = req
            .compares
            .iter()
            .all(|c| state.version_of(&c.key) == c.version);
        if !holds {
            return Ok(TxnResponse {
                succeeded: false,
                revision: state.revision,
                responses: Vec::new(),
            });
        }

        for op in &req.success {
            if let KvOp::Put { lease: Some(id), .. } = op {
                if !state.leases.contains_key(id) {
                    return Err(StorageError::LeaseNotFound { lease_id: *id });
                }
            }
        }

        let mutates = req
            .success
            .iter()
            .any(|op| !matches!(op, KvOp::Get(_)));
        let rev = if mutates {
            state.revision + 1
        } else {
            state.revision
        };

        let mut events = Vec::new();
        let mut responses = Vec::with_capacity(req.success.len());
        for op in req.success {
            match op {
                KvOp::Put { key, value, lease } => {
                    events.push(state.put(&key, value, lease, rev));
                    responses.push(OpResponse::Put);
                }
                KvOp::Delete { key } => {
                    let deleted = match state.delete(&key, rev) {
                        Some(ev) => {
                            events.push(ev);
                            1
                        }
                        None => 0,
                    };
                    responses.push(OpResponse::Delete { deleted });
                }
                KvOp::DeletePrefix { prefix } => {
                    let evs = state.delete_prefix(&prefix, rev);
                    responses.push(OpResponse::Delete {
                        deleted: evs.len() as i64,
                    });
                    events.extend(evs);
                }
                KvOp::Get(range) => {
                    let mut resp = state.range(&range);
                    resp.revision = rev;
                    responses.push(OpResponse::Get(resp));
                }
            }
        }

        state.revision = rev;
        state.notify(rev, events);

        Ok(TxnResponse {
            succeeded: true,
            revision: rev,
            responses,
        })
    }

    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, StorageError> {
        let mut state = self.state.lock().await;
        let id = state.next_lease_id;
        state.next_lease_id += 1;
        state.leases.insert(
            id,
            Lease {
                deadline: Instant::now() + ttl,
                keys: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    async fn watch(&self, req: WatchRequest) -> Result<WatchStream, StorageError> {
        let mut state = self.state.lock().await;
        state.expire(Instant::now());
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        state.watchers.push(Watcher {
            range: req.range,
            tx,
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Compare;

    fn put(key: &str, value: &str) -> KvOp {
        KvOp::Put {
            key: key.to_string(),
            value: value.as_bytes().to_vec(),
            lease: None,
        }
    }

    async fn apply(kv: &MemoryKv, ops: Vec<KvOp>) -> TxnResponse {
        kv.txn(TxnRequest {
            compares: Vec::new(),
            success: ops,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn versions_follow_etcd_rules() {
        let kv = MemoryKv::new();
        apply(&kv, vec![put("/a", "1")]).await;
        apply(&kv, vec![put("/a", "2")]).await;

        let resp = kv.range(RangeRequest::key("/a")).await.unwrap();
        assert_eq!(resp.kvs[0].version, 2);
        assert_eq!(resp.kvs[0].create_revision, 1);
        assert_eq!(resp.kvs[0].mod_revision, 2);

        apply(&kv, vec![KvOp::Delete { key: "/a".into() }]).await;
        apply(&kv, vec![put("/a", "3")]).await;
        let resp = kv.range(RangeRequest::key("/a")).await.unwrap();
        assert_eq!(resp.kvs[0].version, 1);
        assert_eq!(resp.kvs[0].create_revision, 4);
    }

    #[tokio::test]
    async fn failed_compare_applies_nothing() {
        let kv = MemoryKv::new();
        apply(&kv, vec![put("/a", "1")]).await;

        let resp = kv
            .txn(TxnRequest {
                compares: vec![Compare::version("/a", 0)],
                success: vec![put("/a", "2"), put("/b", "2")],
            })
            .await
            .unwrap();
        assert!(!resp.succeeded);
        assert_eq!(kv.revision().await, 1);
        let b = kv.range(RangeRequest::key("/b")).await.unwrap();
        assert!(b.kvs.is_empty());
    }

    #[tokio::test]
    async fn duplicate_mutations_are_rejected() {
        let kv = MemoryKv::new();
        let err = kv
            .txn(TxnRequest {
                compares: Vec::new(),
                success: vec![put("/a", "1"), KvOp::Delete { key: "/a".into() }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[tokio::test]
    async fn range_sorts_and_limits() {
        let kv = MemoryKv::new();
        apply(&kv, vec![put("/p/b", "1")]).await;
        apply(&kv, vec![put("/p/a", "1")]).await;
        apply(&kv, vec![put("/p/c", "1")]).await;
        apply(&kv, vec![put("/q/a", "1")]).await;

        let mut req = RangeRequest::prefix("/p/");
        req.sort = Some((SortTarget::CreateRevision, SortOrder::Descend));
        req.limit = 2;
        let resp = kv.range(req).await.unwrap();
        let keys: Vec<_> = resp.kvs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/p/c", "/p/a"]);
        assert_eq!(resp.count, 3);

        let mut req = RangeRequest::prefix("/p/");
        req.count_only = true;
        let resp = kv.range(req).await.unwrap();
        assert!(resp.kvs.is_empty());
        assert_eq!(resp.count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn leased_keys_expire() {
        let kv = MemoryKv::new();
        let lease = kv.grant_lease(Duration::from_secs(1)).await.unwrap();
        apply(
            &kv,
            vec![KvOp::Put {
                key: "/l".into(),
                value: b"x".to_vec(),
                lease: Some(lease),
            }],
        )
        .await;

        let mut watch = kv
            .watch(WatchRequest {
                range: KeyRange::Key("/l".into()),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let resp = watch.recv().await.unwrap();
        assert_eq!(resp.events[0].kind, EventKind::Delete);
        assert!(kv.range(RangeRequest::key("/l")).await.unwrap().kvs.is_empty());
    }

    #[tokio::test]
    async fn put_with_unknown_lease_fails() {
        let kv = MemoryKv::new();
        let err = kv
            .txn(TxnRequest {
                compares: Vec::new(),
                success: vec![KvOp::Put {
                    key: "/k".into(),
                    value: Vec::new(),
                    lease: Some(42),
                }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LeaseNotFound { lease_id: 42 }));
    }

    #[tokio::test]
    async fn close_watches_ends_streams() {
        let kv = MemoryKv::new();
        let mut watch = kv
            .watch(WatchRequest {
                range: KeyRange::Prefix("/".into()),
            })
            .await
            .unwrap();
        kv.close_watches().await;
        assert!(watch.recv().await.is_none());
    }
}
