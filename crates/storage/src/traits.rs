use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::kv::{
    Compare, KvOp, LeaseId, RangeRequest, RangeResponse, TxnKey, TxnRequest, TxnResponse,
    WatchRequest, WatchStream,
};

/// Client for a linearizable, revisioned key-value store.
///
/// This is the only seam between the control plane and the store. The
/// store itself (replication, consensus, persistence) is a trusted
/// dependency; implementations only translate these four primitives.
///
/// ## Guarantees expected from implementations
///
/// - Every key carries a per-key `version` that is 1 on creation, is
///   incremented by every put, and resets when the key is deleted. A
///   `Compare::version(key, 0)` therefore means "key is absent".
/// - `txn` evaluates all compares and, only if every one holds, applies all
///   ops atomically at a single new revision. Two mutations of the same key
///   in one txn are rejected.
/// - Keys put with a lease are deleted by the store once the lease expires.
/// - `watch` delivers events in revision order. When the store closes the
///   watch, the stream ends; consumers resubscribe.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so that a single client
/// can be shared as [`SharedClient`] across background tasks.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// Read a key, prefix or range.
    async fn range(&self, req: RangeRequest) -> Result<RangeResponse, StorageError>;

    /// Apply a compare-guarded transaction.
    async fn txn(&self, req: TxnRequest) -> Result<TxnResponse, StorageError>;

    /// Grant a lease that expires after `ttl` unless keys are re-put with a
    /// fresh lease.
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, StorageError>;

    /// Open a watch stream starting after the current revision.
    async fn watch(&self, req: WatchRequest) -> Result<WatchStream, StorageError>;
}

/// A client shared between stores, ops and background tasks.
pub type SharedClient = Arc<dyn KvClient>;

/// An operation that can be executed on its own or composed into a
/// [`Txn`](crate::Txn).
///
/// `ops` may need to contact the store (for example to grant a lease), so it
/// is async. `keys` and `cmps` are pure.
#[async_trait]
pub trait TxnOperation: Send + Sync {
    /// The mutations this operation contributes.
    async fn ops(&self) -> Result<Vec<KvOp>, StorageError>;

    /// The keys and prefixes `ops` will mutate. Checked for overlaps before
    /// any op is materialized.
    fn keys(&self) -> Vec<TxnKey>;

    /// The preconditions this operation contributes. ANDed with every other
    /// operation's preconditions inside a transaction.
    fn cmps(&self) -> Vec<Compare>;
}
