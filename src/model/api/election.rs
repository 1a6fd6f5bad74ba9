use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::ElectionStatus,
    db::{
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
    },
    mongodb::Id,
};

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election title.
    pub title: String,
    /// Voting opens at this time.
    pub start_time: DateTime<Utc>,
    /// Voting closes at this time.
    pub end_time: DateTime<Utc>,
}

impl ElectionSpec {
    /// Convert this spec into a new draft election created at `now`.
    pub fn into_election(self, now: DateTime<Utc>) -> NewElection {
        NewElection::new(self.title, self.start_time, self.end_time, now)
    }
}

/// A candidate specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// Candidate name.
    pub name: String,
    /// Party affiliation; omitted for independents.
    #[serde(default)]
    pub party: Option<String>,
}

impl CandidateSpec {
    /// Convert this spec into a new candidate for the given election, created at `now`.
    pub fn into_candidate(self, election_id: Id, now: DateTime<Utc>) -> NewCandidate {
        NewCandidate {
            election_id,
            name: self.name,
            party: self.party,
            created_at: now,
        }
    }
}

/// Top-level election metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ApiId,
    pub title: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Election> for ElectionSummary {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.into(),
            title: election.election.title,
            status: election.election.status,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            created_at: election.election.created_at,
        }
    }
}

/// API-friendly candidate data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub name: String,
    pub party: Option<String>,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            name: candidate.candidate.name,
            party: candidate.candidate.party,
        }
    }
}

/// An election with its candidates, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    #[serde(flatten)]
    pub summary: ElectionSummary,
    pub candidates: Vec<CandidateDescription>,
}

impl ElectionDescription {
    pub fn new(election: Election, candidates: Vec<Candidate>) -> Self {
        Self {
            summary: election.into(),
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl ElectionSpec {
        pub fn current_example() -> Self {
            let now = Utc::now();
            Self {
                title: "Student Union President".to_string(),
                start_time: now - Duration::hours(1),
                end_time: now + Duration::hours(1),
            }
        }
    }

    impl CandidateSpec {
        pub fn example1() -> Self {
            Self {
                name: "Chris Riches".to_string(),
                party: Some("Sensible Party".to_string()),
            }
        }

        pub fn example2() -> Self {
            Self {
                name: "Parry Hotter".to_string(),
                party: None,
            }
        }
    }
}
