//! Wires a key-value client into leader election and the workflow backend.
//!
//! ```toml
//! key_root = "control-plane"
//! worker_id = "host-1"
//!
//! [election]
//! ttl_secs = 30
//!
//! [workflows]
//! workflow_lock_timeout_secs = 60
//! poll_interval_ms = 1000
//! ```

mod config;
mod coordinator;
mod logging;

pub use config::{Config, ConfigError, ElectionConfig, WorkflowsConfig};
pub use coordinator::Coordinator;
pub use logging::{init_logging, init_test_logging};
