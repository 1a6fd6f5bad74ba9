//! The voting core: lifecycle, ledger, tallies, and the coordinator that
//! composes them to cast a vote.

pub mod closer;
pub mod coordinator;
pub mod ledger;
pub mod lifecycle;
pub mod tally;

pub use closer::{ElectionCloserFairing, ElectionClosers};
pub use coordinator::VotingCoordinator;
pub use ledger::VoteLedger;
pub use lifecycle::{is_open_for_voting, Lifecycle};
pub use tally::{CandidateTally, Tally, TallyEngine};

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;

    use super::Lifecycle;
    use crate::model::{
        api::election::CandidateSpec,
        common::ElectionStatus,
        db::{candidate::Candidate, election::Election, election::NewElection},
    };

    const NAMES: [&str; 4] = ["Chris Riches", "Jonathan Langley", "Ellie Hayes", "Luke Downey"];

    /// An active election open for the next hour, with `candidates` candidates
    /// in creation order.
    pub async fn active_election(
        lifecycle: &Lifecycle,
        candidates: usize,
    ) -> (Election, Vec<Candidate>) {
        let draft = lifecycle.create(NewElection::current_example()).await.unwrap();
        let mut added = Vec::with_capacity(candidates);
        for i in 0..candidates {
            let spec = CandidateSpec {
                name: NAMES[i % NAMES.len()].to_string(),
                ..CandidateSpec::example1()
            };
            added.push(
                lifecycle
                    .add_candidate(spec.into_candidate(draft.id, Utc::now()))
                    .await
                    .unwrap(),
            );
        }
        let election = lifecycle
            .transition(draft.id, ElectionStatus::Active, Utc::now())
            .await
            .unwrap();
        (election, added)
    }
}
