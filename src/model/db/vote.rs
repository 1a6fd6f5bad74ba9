use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::stored_precision, mongodb::Id};

/// Core vote data, as stored in the database.
///
/// `(election_id, voter_id)` is unique across all votes.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct VoteCore {
    /// Foreign Key election ID.
    pub election_id: Id,
    /// Foreign Key candidate ID.
    pub candidate_id: Id,
    /// The voter, as known to the identity provider.
    pub voter_id: Id,
    /// When the vote was cast.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
///
/// Votes are immutable once written, so there is no `DerefMut`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Vote {
    /// Give a new vote its ID.
    pub fn from_new(vote: NewVote) -> Self {
        Self {
            id: Id::new(),
            vote: VoteCore {
                cast_at: stored_precision(vote.cast_at),
                ..vote
            },
        }
    }
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

/// One row of the per-candidate vote aggregation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VoteCount {
    #[serde(rename = "_id")]
    pub candidate_id: Id,
    pub votes: i64,
}
