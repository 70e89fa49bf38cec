//! Workflow history events.
//!
//! Events are produced by the workflow executor and treated as opaque facts
//! by the backend, apart from the few attributes it needs for routing
//! (target queue, sub-workflow start, timer schedule IDs).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Metadata, Queue, WorkflowInstance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionFinished,
    WorkflowExecutionCanceled,
    WorkflowExecutionContinuedAsNew,
    WorkflowTaskStarted,
    SignalReceived,
    SideEffectResult,
    ActivityScheduled,
    ActivityCompleted,
    ActivityFailed,
    TimerScheduled,
    TimerFired,
    TimerCanceled,
    SubWorkflowScheduled,
    SubWorkflowCompleted,
    SubWorkflowFailed,
    SubWorkflowCancellationRequested,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventAttributes {
    ExecutionStarted {
        name: String,
        /// Empty means the default queue, or the parent's queue for a
        /// sub-workflow.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue: Option<Queue>,
        #[serde(default)]
        metadata: Metadata,
        #[serde(default)]
        inputs: serde_json::Value,
    },
    ActivityScheduled {
        name: String,
        /// Empty means the scheduling workflow's queue.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        queue: Option<Queue>,
        #[serde(default)]
        inputs: serde_json::Value,
    },
    SubWorkflowFailed {
        error: String,
    },
    Payload {
        #[serde(default)]
        data: serde_json::Value,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: String,
    /// Position in the execution's history. Assigned by the executor once
    /// the event is applied; zero while pending.
    #[serde(default)]
    pub sequence_id: i64,
    pub event_type: EventType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The sequence ID of the event that scheduled this one, for activity,
    /// timer and sub-workflow results.
    #[serde(default)]
    pub schedule_event_id: i64,
    /// Not delivered to the workflow before this time.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub visible_at: Option<OffsetDateTime>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(timestamp: OffsetDateTime, event_type: EventType, attributes: EventAttributes) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_id: 0,
            event_type,
            timestamp,
            schedule_event_id: 0,
            visible_at: None,
            attributes,
        }
    }

    /// An event answering the event with sequence ID `schedule_event_id`.
    pub fn pending(
        timestamp: OffsetDateTime,
        event_type: EventType,
        attributes: EventAttributes,
        schedule_event_id: i64,
    ) -> Self {
        Self {
            schedule_event_id,
            ..Self::new(timestamp, event_type, attributes)
        }
    }

    pub fn with_sequence_id(mut self, sequence_id: i64) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    pub fn with_visible_at(mut self, at: OffsetDateTime) -> Self {
        self.visible_at = Some(at);
        self
    }

    /// Whether the event may be handed to the workflow at `now`.
    pub fn is_visible(&self, now: OffsetDateTime) -> bool {
        self.visible_at.map_or(true, |at| at <= now)
    }
}

/// An event addressed to another workflow instance, e.g. the start event of
/// a sub-workflow or a signal to a sibling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub instance: WorkflowInstance,
    pub event: HistoryEvent,
}

impl WorkflowEvent {
    pub fn new(instance: WorkflowInstance, event: HistoryEvent) -> Self {
        Self { instance, event }
    }
}

/// Group events by target execution, keeping the order in which targets and
/// events first appear.
pub fn events_by_workflow_instance(
    events: Vec<WorkflowEvent>,
) -> Vec<(WorkflowInstance, Vec<WorkflowEvent>)> {
    let mut groups: Vec<(WorkflowInstance, Vec<WorkflowEvent>)> = Vec::new();
    for ev in events {
        match groups
            .iter_mut()
            .find(|(target, _)| target.same_execution(&ev.instance))
        {
            Some((_, group)) => group.push(ev),
            None => groups.push((ev.instance.clone(), vec![ev])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn signal(target: &WorkflowInstance) -> WorkflowEvent {
        WorkflowEvent::new(
            target.clone(),
            HistoryEvent::new(
                OffsetDateTime::now_utc(),
                EventType::SignalReceived,
                EventAttributes::None,
            ),
        )
    }

    #[test]
    fn visibility_respects_visible_at() {
        let now = OffsetDateTime::now_utc();
        let ev = HistoryEvent::new(now, EventType::TimerFired, EventAttributes::None);
        assert!(ev.is_visible(now));

        let later = ev.clone().with_visible_at(now + Duration::seconds(5));
        assert!(!later.is_visible(now));
        assert!(later.is_visible(now + Duration::seconds(5)));
    }

    #[test]
    fn grouping_keeps_first_seen_order() {
        let a = WorkflowInstance::new("a", "1");
        let b = WorkflowInstance::new("b", "1");
        let groups = events_by_workflow_instance(vec![signal(&b), signal(&a), signal(&b)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, b);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, a);
    }

    #[test]
    fn attributes_are_tagged() {
        let attrs = EventAttributes::ActivityScheduled {
            name: "provision".into(),
            queue: Some(Queue::new("host-1")),
            inputs: serde_json::json!({"size": 3}),
        };
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["kind"], "activity_scheduled");
        assert_eq!(json["queue"], "host-1");
    }
}
