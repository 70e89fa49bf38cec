use cplane_storage::StorageError;

/// Errors surfaced by a [`Candidate`](crate::Candidate), either directly or
/// through its error channel.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The store rejected or failed a claim, refresh or release.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Every refresh attempt lost a race with the claim's own expiry or
    /// with another candidate.
    #[error("failed to refresh claim on {election} after {attempts} retries")]
    RefreshRetriesExhausted { election: String, attempts: usize },

    /// The candidate does not hold the election.
    #[error("{candidate_id} is not the leader of {election}")]
    NonLeader {
        election: String,
        candidate_id: String,
    },

    /// The watch on the election key could not be (re)started.
    #[error("failed to start watch: {0}")]
    WatchStart(#[source] StorageError),
}
