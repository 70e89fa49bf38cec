use cplane_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// An active execution already exists for the instance ID.
    #[error("workflow instance already exists")]
    InstanceAlreadyExists,

    #[error("workflow instance not found")]
    InstanceNotFound,

    /// Only finished or continued-as-new executions can be removed.
    #[error("workflow instance is not finished")]
    InstanceNotFinished,

    /// The task's lock expired and is now held by another worker process.
    #[error("task lock lost to another worker")]
    LockLost,

    #[error("activity not found: {activity_id}")]
    ActivityNotFound { activity_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
