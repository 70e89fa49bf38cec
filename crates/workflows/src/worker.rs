use std::fmt;

/// Who holds a task lock.
///
/// `worker_id` must be stable across restarts of the same worker (a host
/// name, for example). `worker_instance_id` is unique per process, which is
/// what lets a restarted worker reclaim locks left behind by its previous
/// process without waiting for them to expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub worker_instance_id: String,
}

impl WorkerIdentity {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.worker_id, self.worker_instance_id)
    }
}
