use serde::{Deserialize, Serialize};

use crate::model::api::election::{CandidateDescription, ElectionSummary};
use crate::voting::tally::Tally;

/// A candidate's position in the published results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    #[serde(flatten)]
    pub candidate: CandidateDescription,
    pub votes: u64,
}

/// Published election results: candidates by descending vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election: ElectionSummary,
    pub results: Vec<CandidateResult>,
    pub total_votes: u64,
}

impl From<Tally> for ElectionResults {
    fn from(tally: Tally) -> Self {
        Self {
            election: tally.election.into(),
            results: tally
                .results
                .into_iter()
                .map(|entry| CandidateResult {
                    candidate: entry.candidate.into(),
                    votes: entry.votes,
                })
                .collect(),
            total_votes: tally.total_votes,
        }
    }
}
