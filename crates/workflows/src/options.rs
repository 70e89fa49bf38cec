use std::time::Duration;

use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    /// TTL of a workflow task lock. A worker that stops extending its task
    /// loses it after this long.
    pub workflow_lock_timeout: Duration,
    /// TTL of an activity task lock.
    pub activity_lock_timeout: Duration,
    /// How long an execution prefers the worker that last ran it.
    pub sticky_timeout: Duration,
    /// Delete continued-as-new executions instead of keeping them as
    /// finished records.
    pub remove_continued_as_new_instances: bool,
    /// Upper bound on how long `wait_for_*_task` sleeps between polls.
    pub poll_interval: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            workflow_lock_timeout: Duration::from_secs(60),
            activity_lock_timeout: Duration::from_secs(120),
            sticky_timeout: Duration::from_secs(30),
            remove_continued_as_new_instances: false,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemovalOptions {
    /// Only remove executions that finished strictly before this time.
    pub finished_before: Option<OffsetDateTime>,
    /// Number of executions removed per transaction.
    pub batch_size: usize,
}

impl RemovalOptions {
    pub fn finished_before(mut self, at: OffsetDateTime) -> Self {
        self.finished_before = Some(at);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            finished_before: None,
            batch_size: 100,
        }
    }
}
