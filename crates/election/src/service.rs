use std::sync::Arc;
use std::time::Duration;

use crate::candidate::{Candidate, ClaimHandler};
use crate::store::{ElectionName, ElectionStore};

/// Hands out candidates that share one [`ElectionStore`].
#[derive(Clone)]
pub struct ElectionService {
    store: Arc<ElectionStore>,
}

impl ElectionService {
    pub fn new(store: ElectionStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &ElectionStore {
        &self.store
    }

    /// A stopped candidate for `name`. Call [`Candidate::start`] to join the
    /// election.
    pub fn new_candidate(
        &self,
        name: impl Into<ElectionName>,
        candidate_id: impl Into<String>,
        ttl: Duration,
        handlers: Vec<ClaimHandler>,
    ) -> Arc<Candidate> {
        Candidate::new(self.store.clone(), name.into(), candidate_id, ttl, handlers)
    }
}
