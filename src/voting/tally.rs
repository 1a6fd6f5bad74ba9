//! The Tally Engine.
//!
//! Counts are always derived from the vote ledger, read from a single store
//! snapshot. There is no stored counter that could drift from the votes.

use log::warn;
use rocket::{
    outcome::try_outcome,
    request::{FromRequest, Outcome, Request},
    State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    common::ElectionStatus,
    db::{candidate::Candidate, election::Election, election::ElectionCore},
    mongodb::Id,
};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate: Candidate,
    pub votes: u64,
}

/// Vote counts for one election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub election: Election,
    /// Most votes first; ties in candidate creation order.
    pub results: Vec<CandidateTally>,
    pub total_votes: u64,
}

impl Tally {
    pub fn votes_for(&self, candidate_id: Id) -> Option<u64> {
        self.results
            .iter()
            .find(|entry| entry.candidate.id == candidate_id)
            .map(|entry| entry.votes)
    }
}

#[derive(Clone)]
pub struct TallyEngine {
    store: Store,
    expose_active_results: bool,
}

impl TallyEngine {
    /// With `expose_active_results`, results of active elections are
    /// publishable too. Never enable this outside development.
    pub fn new(store: Store, expose_active_results: bool) -> Self {
        Self {
            store,
            expose_active_results,
        }
    }

    /// Count the votes for every candidate, whatever the election's status.
    pub async fn tally(&self, election_id: Id) -> Result<Tally> {
        let snapshot = self
            .store
            .tally_snapshot(election_id)
            .await?
            .ok_or(Error::ElectionNotFound(election_id))?;

        let mut results: Vec<_> = snapshot
            .candidates
            .into_iter()
            .map(|candidate| CandidateTally {
                votes: snapshot.counts.get(&candidate.id).copied().unwrap_or(0),
                candidate,
            })
            .collect();
        results.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.candidate.creation_key().cmp(&b.candidate.creation_key()))
        });
        let total_votes = results.iter().map(|entry| entry.votes).sum();

        Ok(Tally {
            election: snapshot.election,
            results,
            total_votes,
        })
    }

    pub fn can_publish(&self, election: &ElectionCore) -> bool {
        match election.status {
            ElectionStatus::Completed => true,
            ElectionStatus::Active => self.expose_active_results,
            ElectionStatus::Draft => false,
        }
    }

    /// Tally an election whose results may be published.
    pub async fn published_tally(&self, election_id: Id) -> Result<Tally> {
        let tally = self.tally(election_id).await?;
        if !self.can_publish(&tally.election) {
            return Err(Error::ResultsNotPublished(election_id));
        }
        if tally.election.status == ElectionStatus::Active {
            warn!("Exposing results of active election {election_id} (expose_active_results is set)");
        }
        Ok(tally)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TallyEngine {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let store = try_outcome!(req.guard::<Store>().await);
        let config = try_outcome!(req.guard::<&State<Config>>().await);
        Outcome::Success(Self::new(store, config.expose_active_results()))
    }
}
