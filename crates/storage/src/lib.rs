//! Versioned, transactional key-value store.
//!
//! Typed operations over a [`KvClient`] with optimistic concurrency: every
//! persisted [`Value`] carries the per-key version it was read at, `create`
//! requires the key to be absent, and `update` requires the version to be
//! unchanged. Mutation ops implement [`TxnOperation`] and can be composed
//! into an atomic [`Txn`].

mod codec;
pub mod conformance;
mod delete;
mod error;
mod get;
pub mod keys;
pub mod kv;
mod memory;
mod put;
mod record;
mod traits;
mod txn;
mod watch;

pub use codec::COMPRESSION_THRESHOLD;
pub use delete::{DeleteOp, DeleteValueOp};
pub use error::StorageError;
pub use get::{ExistsOp, GetMultipleOp, GetOp, GetPrefixOp, GetRangeOp};
pub use kv::{KeyValue, LeaseId, SortOrder, SortTarget, TxnKey};
pub use memory::MemoryKv;
pub use put::PutOp;
pub use record::Value;
pub use traits::{KvClient, SharedClient, TxnOperation};
pub use txn::Txn;
pub use watch::{Event, EventType, Subscription, WatchOp};
