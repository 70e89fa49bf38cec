//! Durable workflow backend on the versioned store.
//!
//! [`KvBackend`] implements [`WorkflowBackend`]: instance lifecycle,
//! append-only history, a pending-event inbox per execution, per-queue task
//! items, leased task locks and sticky worker affinity. All state lives in
//! the store; workers coordinate only through its transactions.

mod backend;
mod diagnostics;
mod error;
mod history;
mod kv_backend;
mod model;
mod options;
mod poll;
pub mod store;
mod worker;

pub use backend::{ActivityTask, Stats, WorkflowBackend, WorkflowTask, WorkflowTaskCompletion};
pub use diagnostics::WorkflowInstanceRef;
pub use error::BackendError;
pub use history::{events_by_workflow_instance, EventAttributes, EventType, HistoryEvent, WorkflowEvent};
pub use kv_backend::KvBackend;
pub use model::{Metadata, ParentRef, Queue, WorkflowInstance, WorkflowInstanceState};
pub use options::{BackendOptions, RemovalOptions};
pub use store::Store;
pub use worker::WorkerIdentity;
