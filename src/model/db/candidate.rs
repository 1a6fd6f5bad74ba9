use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::stored_precision, mongodb::Id};

/// Core candidate data, as stored in the database.
///
/// There is deliberately no vote counter here: counts are always derived
/// from the vote ledger.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CandidateCore {
    /// Foreign Key election ID.
    pub election_id: Id,
    /// Candidate name.
    pub name: String,
    /// Party affiliation, if any.
    pub party: Option<String>,
    /// Creation time; breaks ties in tallies.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Candidate {
    /// Give a new candidate its ID.
    pub fn from_new(candidate: NewCandidate) -> Self {
        Self {
            id: Id::new(),
            candidate: CandidateCore {
                created_at: stored_precision(candidate.created_at),
                ..candidate
            },
        }
    }

    /// Creation order: creation time, then ID.
    pub fn creation_key(&self) -> (DateTime<Utc>, Id) {
        (self.created_at, self.id)
    }
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}
