//! Leader election over the versioned store.
//!
//! Each election is a single leased record. The first candidate to create it
//! becomes leader and keeps it alive by re-putting it with a fresh lease every
//! `ttl / 3`; everyone else watches for its deletion.

mod candidate;
mod error;
mod service;
mod store;

pub use candidate::{claim_handler, Candidate, ClaimHandler, MIN_TTL};
pub use error::ElectionError;
pub use service::ElectionService;
pub use store::{ElectionName, ElectionStore, StoredElection};
