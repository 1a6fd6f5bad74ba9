use chrono::{DateTime, Utc};
use log::debug;
use rocket::{
    outcome::try_outcome,
    request::{FromRequest, Outcome, Request},
};

use crate::error::{Error, Result};
use crate::model::{auth::VoterIdentity, db::vote::Vote, mongodb::Id};

use super::{ledger::VoteLedger, lifecycle::Lifecycle};

/// Casts one vote end-to-end.
#[derive(Clone)]
pub struct VotingCoordinator {
    lifecycle: Lifecycle,
    ledger: VoteLedger,
}

impl VotingCoordinator {
    pub fn new(lifecycle: Lifecycle, ledger: VoteLedger) -> Self {
        Self { lifecycle, ledger }
    }

    /// Cast `voter`'s vote for `candidate_id` in `election_id` at `now`.
    ///
    /// `DuplicateVote` is final: the voter's earlier vote stands, and casting
    /// again can never succeed.
    pub async fn cast_vote(
        &self,
        voter: &VoterIdentity,
        election_id: Id,
        candidate_id: Id,
        now: DateTime<Utc>,
    ) -> Result<Vote> {
        if !voter.verified {
            debug!("Unverified voter {} tried to vote", voter.id);
            return Err(Error::UnverifiedVoter(voter.id));
        }

        let election = self.lifecycle.election(election_id).await?;
        if !self.lifecycle.is_open_for_voting(&election, now) {
            debug!("Voter {} tried to vote in closed election {election_id}", voter.id);
            return Err(Error::ElectionClosed(election_id));
        }

        // Also checks the candidate, and re-checks the window atomically with the insert.
        self.ledger
            .record_vote(election_id, voter.id, candidate_id, now)
            .await
    }

    pub async fn has_voted(&self, voter: &VoterIdentity, election_id: Id) -> Result<bool> {
        self.lifecycle.election(election_id).await?;
        self.ledger.has_voted(election_id, voter.id).await
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VotingCoordinator {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let lifecycle = try_outcome!(req.guard::<Lifecycle>().await);
        let ledger = try_outcome!(req.guard::<VoteLedger>().await);
        Outcome::Success(Self::new(lifecycle, ledger))
    }
}
