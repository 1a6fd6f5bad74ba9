//! The Vote Ledger: an append-only record of votes, at most one per voter per
//! election.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rocket::{
    outcome::try_outcome,
    request::{FromRequest, Outcome, Request},
};

use crate::error::{Error, Result};
use crate::model::{
    db::{
        candidate::Candidate,
        vote::{NewVote, Vote},
    },
    mongodb::Id,
};
use crate::store::Store;

#[derive(Clone)]
pub struct VoteLedger {
    store: Store,
}

impl VoteLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Check that `candidate_id` stands in `election_id`.
    pub async fn check_candidate(&self, election_id: Id, candidate_id: Id) -> Result<Candidate> {
        match self.store.candidate(candidate_id).await? {
            Some(candidate) if candidate.election_id == election_id => Ok(candidate),
            _ => Err(Error::CandidateNotInElection {
                election: election_id,
                candidate: candidate_id,
            }),
        }
    }

    /// Has this voter already voted in this election?
    ///
    /// Only for display; never decide whether to record a vote based on this.
    pub async fn has_voted(&self, election_id: Id, voter_id: Id) -> Result<bool> {
        self.store.has_vote(election_id, voter_id).await
    }

    /// Record a vote cast at `now`.
    ///
    /// Either exactly one vote is written for `(election_id, voter_id)`, or
    /// this fails and nothing is written. The store's uniqueness constraint is
    /// what guarantees this; the early lookup just fails fast in the common
    /// case of a voter resubmitting.
    pub async fn record_vote(
        &self,
        election_id: Id,
        voter_id: Id,
        candidate_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        self.check_candidate(election_id, candidate_id).await?;

        if self.has_voted(election_id, voter_id).await? {
            debug!("Voter {voter_id} tried to vote twice in election {election_id}");
            return Err(Error::DuplicateVote {
                election: election_id,
                voter: voter_id,
            });
        }

        let vote = NewVote {
            election_id,
            candidate_id,
            voter_id,
            cast_at: now,
        };
        let vote = self.store.insert_vote(&vote).await.map_err(|e| {
            debug!("Vote by {voter_id} in election {election_id} rejected: {e}");
            e
        })?;
        info!("Recorded vote {} in election {election_id}", vote.id);
        Ok(vote)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoteLedger {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let store = try_outcome!(req.guard::<Store>().await);
        Outcome::Success(Self::new(store))
    }
}
