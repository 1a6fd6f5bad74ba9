//! The Election Store: persisted elections, candidates and votes.
//!
//! Every backend must enforce `UNIQUE(election_id, voter_id)` on votes itself;
//! application-level checks elsewhere only exist to produce friendlier errors.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;
use rocket::{
    outcome::try_outcome,
    request::{FromRequest, Outcome, Request},
    tokio, State,
};

use crate::error::{Error, Result};
use crate::model::{
    common::ElectionStatus,
    db::{
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
        vote::{NewVote, Vote},
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Everything a tally needs, read as of a single instant.
#[derive(Debug, Clone)]
pub struct TallySnapshot {
    pub election: Election,
    pub candidates: Vec<Candidate>,
    /// Votes per candidate ID. Candidates without votes may be absent.
    pub counts: HashMap<Id, u64>,
}

/// Transactional storage primitives for the voting core.
#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Insert a new election, returning it with its ID.
    async fn insert_election(&self, election: &NewElection) -> Result<Election>;

    async fn election(&self, id: Id) -> Result<Option<Election>>;

    /// All elections whose status is one of `statuses`, in creation order.
    async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>>;

    /// Atomically move an election from status `from` to status `to`, setting
    /// its end time. Returns `None` if the election is not currently in `from`.
    async fn set_status(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Election>>;

    /// Delete a draft election and its candidates.
    /// Returns false if there is no such draft election.
    async fn delete_draft_election(&self, id: Id) -> Result<bool>;

    /// Insert a candidate, provided its election is still a draft.
    /// Returns `None` if there is no such draft election.
    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Option<Candidate>>;

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>>;

    /// All candidates of an election, in creation order.
    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>>;

    async fn has_vote(&self, election_id: Id, voter_id: Id) -> Result<bool>;

    /// Record a vote in a single transaction that re-checks the election is
    /// open at `vote.cast_at`.
    ///
    /// Fails with `ElectionNotFound`, `ElectionClosed`, or `DuplicateVote`; in
    /// every failure case no vote is written.
    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote>;

    /// Read an election, its candidates and their vote counts consistently.
    async fn tally_snapshot(&self, election_id: Id) -> Result<Option<TallySnapshot>>;
}

/// A shared handle on the configured [`ElectionStore`].
///
/// Every operation is bounded by a timeout; expiry fails with
/// [`Error::StoreUnavailable`], which callers may retry.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn ElectionStore>,
    timeout: Duration,
}

impl Store {
    pub fn new(inner: Arc<dyn ElectionStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// A store backed by a fresh, empty [`MemoryStore`].
    pub fn in_memory(timeout: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), timeout)
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Store operation `{operation}` timed out after {}ms",
                    self.timeout.as_millis()
                );
                Err(Error::StoreUnavailable(format!(
                    "`{operation}` timed out"
                )))
            }
        }
    }

    pub async fn insert_election(&self, election: &NewElection) -> Result<Election> {
        self.bounded("insert_election", self.inner.insert_election(election))
            .await
    }

    pub async fn election(&self, id: Id) -> Result<Option<Election>> {
        self.bounded("election", self.inner.election(id)).await
    }

    pub async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        self.bounded("elections", self.inner.elections(statuses))
            .await
    }

    pub async fn set_status(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Election>> {
        self.bounded("set_status", self.inner.set_status(id, from, to, end_time))
            .await
    }

    pub async fn delete_draft_election(&self, id: Id) -> Result<bool> {
        self.bounded("delete_draft_election", self.inner.delete_draft_election(id))
            .await
    }

    pub async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Option<Candidate>> {
        self.bounded("insert_candidate", self.inner.insert_candidate(candidate))
            .await
    }

    pub async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        self.bounded("candidate", self.inner.candidate(id)).await
    }

    pub async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        self.bounded("candidates", self.inner.candidates(election_id))
            .await
    }

    pub async fn has_vote(&self, election_id: Id, voter_id: Id) -> Result<bool> {
        self.bounded("has_vote", self.inner.has_vote(election_id, voter_id))
            .await
    }

    pub async fn insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        self.bounded("insert_vote", self.inner.insert_vote(vote))
            .await
    }

    pub async fn tally_snapshot(&self, election_id: Id) -> Result<Option<TallySnapshot>> {
        self.bounded("tally_snapshot", self.inner.tally_snapshot(election_id))
            .await
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Get the store from the managed state.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let store = try_outcome!(req.guard::<&State<Store>>().await);
        Outcome::Success(store.inner().clone())
    }
}
