use std::sync::Arc;

use cplane_election::{Candidate, ClaimHandler, ElectionName, ElectionService, ElectionStore};
use cplane_storage::SharedClient;
use cplane_workflows::{KvBackend, Store};
use tracing::info;

use crate::config::{Config, ConfigError};

/// The coordination services of one process, sharing a single client and
/// key root.
pub struct Coordinator {
    config: Config,
    elections: ElectionService,
    workflows: Arc<KvBackend>,
}

impl Coordinator {
    pub fn new(client: SharedClient, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let elections = ElectionService::new(ElectionStore::new(client.clone(), &config.key_root));
        let workflows = Arc::new(KvBackend::new(
            Store::new(client, &config.key_root),
            config.workflows.backend_options(),
            &config.worker_id,
        ));
        info!(
            key_root = %config.key_root,
            worker_id = %config.worker_id,
            worker_instance_id = %workflows.identity().worker_instance_id,
            "coordinator ready"
        );

        Ok(Self {
            config,
            elections,
            workflows,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn elections(&self) -> &ElectionService {
        &self.elections
    }

    pub fn workflows(&self) -> &Arc<KvBackend> {
        &self.workflows
    }

    /// A stopped candidate for `name`, identified by this worker and using
    /// the configured TTL.
    pub fn candidate(
        &self,
        name: impl Into<ElectionName>,
        handlers: Vec<ClaimHandler>,
    ) -> Arc<Candidate> {
        self.elections.new_candidate(
            name,
            self.config.worker_id.clone(),
            self.config.election_ttl(),
            handlers,
        )
    }
}
