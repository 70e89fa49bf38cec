use std::path::{Path, PathBuf};
use std::time::Duration;

use cplane_workflows::BackendOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration. Every field has a default, so an empty file is
/// valid as long as `$HOSTNAME` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Namespace under which all coordination keys are stored.
    #[serde(default = "default_key_root")]
    pub key_root: String,

    /// Stable identity of this host. A restarted process with the same
    /// worker ID may take over its predecessor's workflow locks.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    #[serde(default)]
    pub election: ElectionConfig,

    #[serde(default)]
    pub workflows: WorkflowsConfig,
}

/// `[election]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElectionConfig {
    #[serde(default = "default_election_ttl_secs")]
    pub ttl_secs: u64,
}

/// `[workflows]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowsConfig {
    #[serde(default = "default_workflow_lock_timeout_secs")]
    pub workflow_lock_timeout_secs: u64,
    #[serde(default = "default_activity_lock_timeout_secs")]
    pub activity_lock_timeout_secs: u64,
    #[serde(default = "default_sticky_timeout_secs")]
    pub sticky_timeout_secs: u64,
    #[serde(default)]
    pub remove_continued_as_new_instances: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_key_root() -> String {
    "control-plane".to_string()
}

fn default_worker_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_default()
}

fn default_election_ttl_secs() -> u64 {
    30
}

fn default_workflow_lock_timeout_secs() -> u64 {
    60
}

fn default_activity_lock_timeout_secs() -> u64 {
    120
}

fn default_sticky_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_root: default_key_root(),
            worker_id: default_worker_id(),
            election: ElectionConfig::default(),
            workflows: WorkflowsConfig::default(),
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_election_ttl_secs(),
        }
    }
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            workflow_lock_timeout_secs: default_workflow_lock_timeout_secs(),
            activity_lock_timeout_secs: default_activity_lock_timeout_secs(),
            sticky_timeout_secs: default_sticky_timeout_secs(),
            remove_continued_as_new_instances: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Check every constraint, reporting all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.key_root.trim_matches('/').is_empty() {
            errors.push("key_root must not be empty".to_string());
        }
        if self.worker_id.trim().is_empty() {
            errors.push("worker_id must be set (or $HOSTNAME exported)".to_string());
        }
        if self.election.ttl_secs == 0 {
            errors.push("election.ttl_secs must be greater than zero".to_string());
        }

        let w = &self.workflows;
        for (name, value) in [
            ("workflows.workflow_lock_timeout_secs", w.workflow_lock_timeout_secs),
            ("workflows.activity_lock_timeout_secs", w.activity_lock_timeout_secs),
            ("workflows.sticky_timeout_secs", w.sticky_timeout_secs),
            ("workflows.poll_interval_ms", w.poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than zero"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    pub fn election_ttl(&self) -> Duration {
        Duration::from_secs(self.election.ttl_secs)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl WorkflowsConfig {
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            workflow_lock_timeout: Duration::from_secs(self.workflow_lock_timeout_secs),
            activity_lock_timeout: Duration::from_secs(self.activity_lock_timeout_secs),
            sticky_timeout: Duration::from_secs(self.sticky_timeout_secs),
            remove_continued_as_new_instances: self.remove_continued_as_new_instances,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_parses() {
        let config: Config = r#"
            key_root = "cp"
            worker_id = "host-1"

            [election]
            ttl_secs = 10

            [workflows]
            workflow_lock_timeout_secs = 5
            activity_lock_timeout_secs = 6
            sticky_timeout_secs = 7
            remove_continued_as_new_instances = true
            poll_interval_ms = 250
        "#
        .parse()
        .unwrap();

        assert_eq!(config.key_root, "cp");
        assert_eq!(config.worker_id, "host-1");
        assert_eq!(config.election_ttl(), Duration::from_secs(10));

        let opts = config.workflows.backend_options();
        assert_eq!(opts.workflow_lock_timeout, Duration::from_secs(5));
        assert_eq!(opts.activity_lock_timeout, Duration::from_secs(6));
        assert_eq!(opts.sticky_timeout, Duration::from_secs(7));
        assert!(opts.remove_continued_as_new_instances);
        assert_eq!(opts.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn sections_default() {
        let config: Config = "worker_id = \"host-1\"".parse().unwrap();
        assert_eq!(config.key_root, "control-plane");
        assert_eq!(config.election, ElectionConfig::default());
        assert_eq!(config.workflows, WorkflowsConfig::default());
        assert_eq!(
            config.workflows.backend_options(),
            BackendOptions::default()
        );
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let err = r#"
            worker_id = "host-1"
            [election]
            ttl_secs = 0
            [workflows]
            poll_interval_ms = 0
        "#
        .parse::<Config>()
        .unwrap_err();

        let ConfigError::Invalid(msg) = err else {
            panic!("expected Invalid, got {err:?}");
        };
        assert!(msg.contains("election.ttl_secs"));
        assert!(msg.contains("workflows.poll_interval_ms"));
    }

    #[test]
    fn empty_identity_is_rejected() {
        let config = Config {
            key_root: "/".into(),
            worker_id: "  ".into(),
            ..Config::default()
        };
        let ConfigError::Invalid(msg) = config.validate().unwrap_err() else {
            panic!("expected Invalid");
        };
        assert!(msg.contains("key_root"));
        assert!(msg.contains("worker_id"));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let err = "worker_id = \"h\"\nbogus = 1".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::from_path("/nonexistent/cplane.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cplane.toml"));
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
