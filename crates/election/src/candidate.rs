//! A single participant in a named election.
//!
//! A started candidate runs two background tasks: a renewal ticker that
//! re-checks (and, when leader, refreshes) the claim every `ttl / 3`, and a
//! watch on the election key that re-checks the claim as soon as the current
//! holder's record is deleted. A watch that fails to start is retried every
//! renewal period. Both tasks exit when the candidate is stopped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cplane_storage::{EventType, StorageError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ElectionError;
use crate::store::{ElectionName, ElectionStore, StoredElection};

const MAX_CLAIM_RETRIES: usize = 3;

/// Shorter TTLs are raised to this. The renewal period is a third of it.
pub const MIN_TTL: Duration = Duration::from_millis(300);

const ERROR_CHANNEL_CAPACITY: usize = 8;

/// Invoked on a fresh task each time the candidate claims leadership. The
/// token is cancelled when leadership is released or observed to be lost.
pub type ClaimHandler =
    Arc<dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wrap an async closure as a [`ClaimHandler`].
pub fn claim_handler<F, Fut>(f: F) -> ClaimHandler
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |token| Box::pin(f(token)))
}

pub struct Candidate {
    store: Arc<ElectionStore>,
    election_name: ElectionName,
    candidate_id: String,
    ttl: Duration,
    is_leader: AtomicBool,
    /// Set while started. Guards start/stop bookkeeping only.
    run: AsyncMutex<Option<CancellationToken>>,
    /// Serializes claim checks between the ticker, the watch and stop.
    claim_lock: AsyncMutex<()>,
    /// Cancelled when the current leadership term ends.
    term: Mutex<Option<CancellationToken>>,
    handlers: Mutex<Vec<ClaimHandler>>,
    err_tx: mpsc::Sender<ElectionError>,
    err_rx: Mutex<Option<mpsc::Receiver<ElectionError>>>,
}

impl Candidate {
    pub fn new(
        store: Arc<ElectionStore>,
        election_name: ElectionName,
        candidate_id: impl Into<String>,
        ttl: Duration,
        handlers: Vec<ClaimHandler>,
    ) -> Arc<Self> {
        let (err_tx, err_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        if ttl < MIN_TTL {
            warn!(
                %election_name,
                ?ttl,
                min = ?MIN_TTL,
                "election ttl too short, raising it"
            );
        }
        Arc::new(Self {
            store,
            election_name,
            candidate_id: candidate_id.into(),
            ttl: ttl.max(MIN_TTL),
            is_leader: AtomicBool::new(false),
            run: AsyncMutex::new(None),
            claim_lock: AsyncMutex::new(()),
            term: Mutex::new(None),
            handlers: Mutex::new(handlers),
            err_tx,
            err_rx: Mutex::new(Some(err_rx)),
        })
    }

    pub fn election_name(&self) -> &ElectionName {
        &self.election_name
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Claim leadership if the slot is free, then keep participating in the
    /// background. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<(), ElectionError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Ok(());
        }

        let token = CancellationToken::new();
        self.lock_and_check_claim(&token).await?;

        tokio::spawn(self.clone().renew_loop(token.clone()));
        tokio::spawn(self.clone().watch_loop(token.clone()));
        *run = Some(token);

        if self.is_leader() {
            debug!(
                election_name = %self.election_name,
                candidate_id = %self.candidate_id,
                "i am the current leader"
            );
        }
        Ok(())
    }

    /// Stop participating and release the claim if held. Idempotent.
    ///
    /// Releasing is bounded by the TTL; a claim that has already expired or
    /// been taken over is not an error.
    pub async fn stop(&self) -> Result<(), ElectionError> {
        let mut run = self.run.lock().await;
        let Some(token) = run.take() else {
            return Ok(());
        };
        token.cancel();

        let released = tokio::time::timeout(self.ttl, self.release()).await;
        self.set_leader(false);
        match released {
            Ok(result) => result,
            Err(_) => Err(ElectionError::Storage(StorageError::Backend(format!(
                "timed out releasing claim on {}",
                self.election_name
            )))),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Confirm against the store that this candidate holds the election.
    pub async fn ensure_leader(&self) -> Result<(), ElectionError> {
        let non_leader = || ElectionError::NonLeader {
            election: self.election_name.to_string(),
            candidate_id: self.candidate_id.clone(),
        };
        match self.store.get_by_key(&self.election_name).exec().await {
            Ok(curr) if curr.leader_id == self.candidate_id => Ok(()),
            Ok(_) | Err(StorageError::NotFound { .. }) => Err(non_leader()),
            Err(e) => Err(e.into()),
        }
    }

    /// Errors from background claim checks and watches. Can be taken once.
    pub fn errors(&self) -> Option<mpsc::Receiver<ElectionError>> {
        self.err_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn add_handlers(&self, handlers: impl IntoIterator<Item = ClaimHandler>) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handlers);
    }

    // ── Background tasks ─────────────────────────────────────────────────────

    fn tick_period(&self) -> Duration {
        self.ttl / 3
    }

    async fn renew_loop(self: Arc<Self>, token: CancellationToken) {
        let period = self.tick_period();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.lock_and_check_claim(&token).await {
                        self.report(e);
                    }
                }
            }
        }
    }

    async fn watch_loop(self: Arc<Self>, token: CancellationToken) {
        loop {
            debug!(election_name = %self.election_name, "starting watch");
            let op = self.store.watch(&self.election_name);
            let mut sub = match op.subscribe().await {
                Ok(sub) => sub,
                Err(e) => {
                    self.report(ElectionError::WatchStart(e));
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(self.tick_period()) => continue,
                    }
                }
            };

            loop {
                let ev = tokio::select! {
                    _ = token.cancelled() => return,
                    ev = sub.next() => ev,
                };
                let Some(ev) = ev else {
                    return;
                };
                match ev.event_type {
                    EventType::Delete => {
                        // The ticker may have re-claimed already; the check
                        // handles both cases.
                        if let Err(e) = self.lock_and_check_claim(&token).await {
                            self.report(e);
                        }
                    }
                    EventType::Error => {
                        debug!(
                            election_name = %self.election_name,
                            error = ?ev.err,
                            "encountered a watch error"
                        );
                        match ev.err {
                            Some(StorageError::WatchClosed) => break,
                            Some(e) => self.report(e.into()),
                            None => {}
                        }
                    }
                    EventType::Put => {}
                }
            }

            if token.is_cancelled() {
                return;
            }
        }
    }

    fn report(&self, err: ElectionError) {
        match self.err_tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) | Err(TrySendError::Closed(err)) => {
                warn!(
                    election_name = %self.election_name,
                    candidate_id = %self.candidate_id,
                    error = %err,
                    "dropping election error"
                );
            }
        }
    }

    // ── Claim handling ───────────────────────────────────────────────────────

    async fn lock_and_check_claim(&self, token: &CancellationToken) -> Result<(), ElectionError> {
        let _guard = self.claim_lock.lock().await;
        if token.is_cancelled() {
            return Ok(());
        }
        self.check_claim(token).await
    }

    async fn check_claim(&self, token: &CancellationToken) -> Result<(), ElectionError> {
        for _ in 0..MAX_CLAIM_RETRIES {
            let curr = match self.store.get_by_key(&self.election_name).exec().await {
                Ok(curr) => curr,
                Err(StorageError::NotFound { .. }) => return self.attempt_claim(token).await,
                Err(e) => return Err(e.into()),
            };

            let mine = curr.leader_id == self.candidate_id;
            self.set_leader(mine);
            if !mine {
                return Ok(());
            }

            match self.store.update(curr).with_ttl(self.ttl).exec().await {
                Ok(()) => return Ok(()),
                // The claim expired between the read and the refresh. The
                // next read shows it gone or owned by someone else.
                Err(StorageError::VersionMismatch { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ElectionError::RefreshRetriesExhausted {
            election: self.election_name.to_string(),
            attempts: MAX_CLAIM_RETRIES,
        })
    }

    async fn attempt_claim(&self, token: &CancellationToken) -> Result<(), ElectionError> {
        debug!(
            election_name = %self.election_name,
            candidate_id = %self.candidate_id,
            "attempting to claim leadership"
        );

        let record = StoredElection::new(self.election_name.clone(), self.candidate_id.clone());
        match self.store.create(record).with_ttl(self.ttl).exec().await {
            Ok(()) => {
                debug!(
                    election_name = %self.election_name,
                    candidate_id = %self.candidate_id,
                    "successfully claimed leadership"
                );
                let term = token.child_token();
                self.begin_term(term.clone());
                let handlers = self
                    .handlers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for handler in handlers {
                    tokio::spawn(handler(term.clone()));
                }
                Ok(())
            }
            Err(StorageError::AlreadyExists { .. }) => {
                self.set_leader(false);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self) -> Result<(), ElectionError> {
        let _guard = self.claim_lock.lock().await;
        if !self.is_leader() {
            return Ok(());
        }

        let curr = match self.store.get_by_key(&self.election_name).exec().await {
            Ok(curr) => curr,
            // Expired and nobody claimed it since.
            Err(StorageError::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if curr.leader_id != self.candidate_id {
            return Ok(());
        }

        match self.store.delete(&curr).exec().await {
            Ok(()) | Err(StorageError::VersionMismatch { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn begin_term(&self, term: CancellationToken) {
        self.is_leader.store(true, Ordering::SeqCst);
        let prev = self
            .term
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(term);
        if let Some(prev) = prev {
            prev.cancel();
        }
    }

    fn set_leader(&self, leader: bool) {
        let was = self.is_leader.swap(leader, Ordering::SeqCst);
        if was && !leader {
            debug!(
                election_name = %self.election_name,
                candidate_id = %self.candidate_id,
                "no longer the leader"
            );
            let term = self
                .term
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(term) = term {
                term.cancel();
            }
        }
    }
}
