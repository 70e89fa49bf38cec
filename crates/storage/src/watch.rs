use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec;
use crate::error::StorageError;
use crate::keys::normalize_prefix;
use crate::kv::{EventKind, KeyRange, KvEvent, WatchRequest, WatchStream};
use crate::record::Value;
use crate::traits::SharedClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
    /// The watch failed. `Event::err` carries the reason; `WatchClosed`
    /// means the store terminated the stream and the caller should
    /// resubscribe.
    Error,
}

/// A decoded change delivered by a [`WatchOp`].
#[derive(Debug)]
pub struct Event<V> {
    pub event_type: EventType,
    pub key: String,
    /// The new value for puts. `None` for deletes and errors.
    pub value: Option<V>,
    pub is_create: bool,
    pub is_modify: bool,
    pub revision: i64,
    pub err: Option<StorageError>,
}

impl<V: Value> Event<V> {
    fn error(err: StorageError) -> Self {
        Self {
            event_type: EventType::Error,
            key: String::new(),
            value: None,
            is_create: false,
            is_modify: false,
            revision: 0,
            err: Some(err),
        }
    }

    fn from_kv_event(ev: KvEvent) -> Self {
        let is_create = ev.is_create();
        let is_modify = ev.is_modify();
        match ev.kind {
            EventKind::Delete => Self {
                event_type: EventType::Delete,
                key: ev.kv.key,
                value: None,
                is_create,
                is_modify,
                revision: ev.kv.mod_revision,
                err: None,
            },
            EventKind::Put => match codec::decode::<V>(&ev.kv.key, &ev.kv.value, ev.kv.version) {
                Ok(val) => Self {
                    event_type: EventType::Put,
                    key: ev.kv.key,
                    value: Some(val),
                    is_create,
                    is_modify,
                    revision: ev.kv.mod_revision,
                    err: None,
                },
                Err(e) => Self::error(e),
            },
        }
    }
}

/// A live watch stream yielding decoded events.
pub struct Subscription<V> {
    stream: WatchStream,
    token: CancellationToken,
    pending: VecDeque<Event<V>>,
    done: bool,
}

impl<V: Value> Subscription<V> {
    /// The next event. Returns `None` once the watch has been closed locally.
    /// When the store terminates the stream, a single `Error` event carrying
    /// `WatchClosed` is yielded first.
    pub async fn next(&mut self) -> Option<Event<V>> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Some(ev);
            }
            if self.done {
                return None;
            }
            tokio::select! {
                _ = self.token.cancelled() => {
                    self.done = true;
                    return None;
                }
                resp = self.stream.recv() => match resp {
                    Some(resp) => {
                        self.pending
                            .extend(resp.events.into_iter().map(Event::from_kv_event));
                    }
                    None => {
                        self.done = true;
                        self.token.cancel();
                        return Some(Event::error(StorageError::WatchClosed));
                    }
                },
            }
        }
    }
}

/// Watch a single key or every key under a prefix.
///
/// Only one consumer can be active at a time; starting a second one before
/// the first is closed fails with `WatchAlreadyInProgress`. Dropping the op
/// closes the watch.
pub struct WatchOp<V> {
    client: SharedClient,
    range: KeyRange,
    token: Mutex<Option<CancellationToken>>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Value> WatchOp<V> {
    pub fn key(client: SharedClient, key: impl Into<String>) -> Self {
        Self::new(client, KeyRange::Key(key.into()))
    }

    /// The prefix is normalized to end in `/`.
    pub fn prefix(client: SharedClient, prefix: impl AsRef<str>) -> Self {
        Self::new(client, KeyRange::Prefix(normalize_prefix(prefix.as_ref())))
    }

    fn new(client: SharedClient, range: KeyRange) -> Self {
        Self {
            client,
            range,
            token: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    /// Open the stream and return it as a pull-based subscription.
    pub async fn subscribe(&self) -> Result<Subscription<V>, StorageError> {
        let token = {
            let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return Err(StorageError::WatchAlreadyInProgress);
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        let stream = match self
            .client
            .watch(WatchRequest {
                range: self.range.clone(),
            })
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                token.cancel();
                return Err(e);
            }
        };

        Ok(Subscription {
            stream,
            token,
            pending: VecDeque::new(),
            done: false,
        })
    }

    /// Call `handle` for every event on a background task until the watch is
    /// closed or the store terminates it. In the latter case `handle`
    /// receives a final `Error` event carrying `WatchClosed`.
    pub async fn watch<F>(&self, mut handle: F) -> Result<(), StorageError>
    where
        F: FnMut(Event<V>) + Send + 'static,
    {
        let mut sub = self.subscribe().await?;
        tokio::spawn(async move {
            while let Some(ev) = sub.next().await {
                handle(ev);
            }
        });
        Ok(())
    }

    /// Block until `predicate` returns true for an event, the watch is
    /// closed, or `timeout` elapses. Always closes the watch before
    /// returning.
    pub async fn until<F>(&self, timeout: Duration, mut predicate: F) -> Result<(), StorageError>
    where
        F: FnMut(&Event<V>) -> bool + Send,
    {
        let result = tokio::time::timeout(timeout, async {
            let mut sub = self.subscribe().await?;
            while let Some(ev) = sub.next().await {
                if let Some(err) = ev.err {
                    return Err(err);
                }
                if predicate(&ev) {
                    return Ok(());
                }
            }
            Ok(())
        })
        .await;
        self.close();

        match result {
            Ok(inner) => inner,
            Err(_) => {
                debug!(range = ?self.range, "watch condition timed out");
                Err(StorageError::WatchUntilTimedOut)
            }
        }
    }

    /// Stop the active consumer, if any. Safe to call repeatedly and from
    /// multiple tasks.
    pub fn close(&self) {
        let token = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }
}

impl<V> Drop for WatchOp<V> {
    fn drop(&mut self) {
        let slot = self.token.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.take() {
            token.cancel();
        }
    }
}
