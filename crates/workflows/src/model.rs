use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form key/value metadata carried with an instance, e.g. tracing
/// context propagated from the caller.
pub type Metadata = BTreeMap<String, String>;

/// Name of a task queue. Workers poll one or more queues in priority order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Queue(String);

impl Queue {
    pub const DEFAULT: &'static str = "default";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Queue {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The parent of a sub-workflow, and the event in the parent's history that
/// scheduled it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRef {
    pub instance_id: String,
    pub execution_id: String,
    pub schedule_event_id: i64,
}

/// One execution of a workflow instance. An instance ID can have several
/// executions over time (continue-as-new), at most one of them active.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: String,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
}

impl WorkflowInstance {
    pub fn new(instance_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            execution_id: execution_id.into(),
            parent: None,
        }
    }

    /// A new execution with a random execution ID.
    pub fn with_new_execution(instance_id: impl Into<String>) -> Self {
        Self::new(instance_id, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_parent(mut self, parent: ParentRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Whether both refer to the same execution, ignoring the parent.
    pub fn same_execution(&self, other: &WorkflowInstance) -> bool {
        self.instance_id == other.instance_id && self.execution_id == other.execution_id
    }
}

impl fmt::Display for WorkflowInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instance_id, self.execution_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowInstanceState {
    Active,
    Finished,
    ContinuedAsNew,
}

impl WorkflowInstanceState {
    pub fn is_active(self) -> bool {
        self == WorkflowInstanceState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_defaults_to_default() {
        assert_eq!(Queue::default().as_str(), "default");
    }

    #[test]
    fn same_execution_ignores_parent() {
        let a = WorkflowInstance::new("i", "e");
        let b = WorkflowInstance::new("i", "e").with_parent(ParentRef {
            instance_id: "p".into(),
            execution_id: "pe".into(),
            schedule_event_id: 3,
        });
        assert!(a.same_execution(&b));
        assert_ne!(a, b);
        assert!(!a.same_execution(&WorkflowInstance::new("i", "other")));
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&WorkflowInstanceState::ContinuedAsNew).unwrap();
        assert_eq!(json, r#""continued_as_new""#);
    }
}
