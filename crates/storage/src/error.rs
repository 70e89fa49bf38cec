/// All errors that can be returned by the versioned store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No value was found for the given key.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A create failed because the key already exists.
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    /// Optimistic concurrency control conflict: the stored value's version
    /// did not match the version held by the caller.
    #[error("value version mismatch: {key}")]
    VersionMismatch { key: String },

    /// One of the compare conditions in a transaction, such as
    /// `version = 0`, was not met. Nothing in the transaction was applied.
    #[error("operation constraint violated")]
    OperationConstraintViolated,

    /// More than one operation in a transaction touched the same key. The
    /// transaction was rejected before anything was sent to the store.
    #[error("duplicate keys in transaction:\n{}", .ops.join("\n"))]
    DuplicateKeysInTransaction { ops: Vec<String> },

    /// The watch was started while a previous start is still in progress.
    #[error("watch already in progress")]
    WatchAlreadyInProgress,

    /// The server forced the watch to close. Callers should resubscribe.
    #[error("watch closed by server")]
    WatchClosed,

    /// The condition given to `WatchOp::until` was not met in time.
    #[error("timed out waiting for watch condition")]
    WatchUntilTimedOut,

    /// The lease attached to a put no longer exists.
    #[error("lease not found: {lease_id}")]
    LeaseNotFound { lease_id: i64 },

    /// A value could not be serialized for storage.
    #[error("failed to encode value for {key}: {message}")]
    Encode { key: String, message: String },

    /// A stored value could not be decoded into the requested type.
    #[error("failed to decode {key}: {message}")]
    Decode { key: String, message: String },

    /// A backend-specific error (connection, timeout, rejected request).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True for errors that signal a lost optimistic-concurrency race rather
    /// than a malfunction. Callers typically retry or move on.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::AlreadyExists { .. }
                | StorageError::VersionMismatch { .. }
                | StorageError::OperationConstraintViolated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_message_lists_every_op() {
        let err = StorageError::DuplicateKeysInTransaction {
            ops: vec!["\tput a".to_string(), "\tdelete a".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("put a"));
        assert!(msg.contains("delete a"));
    }

    #[test]
    fn conflicts_are_classified() {
        assert!(StorageError::OperationConstraintViolated.is_conflict());
        assert!(StorageError::VersionMismatch { key: "k".into() }.is_conflict());
        assert!(!StorageError::WatchClosed.is_conflict());
        assert!(!StorageError::Backend("boom".into()).is_conflict());
    }
}
