use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::{bson::de::Error as DecodeError, error::Error as DbError};
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::{common::ElectionStatus, mongodb::is_unavailable_error, mongodb::Id};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Election {0} not found")]
    ElectionNotFound(Id),
    #[error("Election {0} is not open")]
    ElectionClosed(Id),
    #[error("Cannot transition election from {from} to {to}")]
    InvalidTransition {
        from: ElectionStatus,
        to: ElectionStatus,
    },
    #[error("Candidate {candidate} does not stand in election {election}")]
    CandidateNotInElection { election: Id, candidate: Id },
    #[error("Voter {0} has not verified their identity")]
    UnverifiedVoter(Id),
    #[error("Voter {voter} has already voted in election {election}")]
    DuplicateVote { election: Id, voter: Id },
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Results for election {0} are not published")]
    ResultsNotPublished(Id),
    #[error("Election {0} is no longer a draft")]
    ElectionLocked(Id),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Db(DbError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl Error {
    /// A stable, machine-readable name for this kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ElectionNotFound(_) => "election_not_found",
            Self::ElectionClosed(_) => "election_closed",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CandidateNotInElection { .. } => "candidate_not_in_election",
            Self::UnverifiedVoter(_) => "unverified_voter",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::ResultsNotPublished(_) => "results_not_published",
            Self::ElectionLocked(_) => "election_locked",
            Self::BadRequest(_) => "bad_request",
            Self::Db(_) | Self::Decode(_) => "internal",
            Self::Jwt(_) => "unauthenticated",
        }
    }

    /// Only an unavailable store is worth retrying; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub fn status(&self) -> Status {
        match self {
            Self::ElectionNotFound(_) => Status::NotFound,
            Self::ElectionClosed(_) => Status::Forbidden,
            Self::InvalidTransition { .. } => Status::Conflict,
            Self::CandidateNotInElection { .. } => Status::UnprocessableEntity,
            Self::UnverifiedVoter(_) => Status::Forbidden,
            Self::DuplicateVote { .. } => Status::Conflict,
            Self::StoreUnavailable(_) => Status::ServiceUnavailable,
            Self::Unauthenticated(_) | Self::Jwt(_) => Status::Unauthorized,
            Self::ResultsNotPublished(_) => Status::Forbidden,
            Self::ElectionLocked(_) => Status::Conflict,
            Self::BadRequest(_) => Status::BadRequest,
            Self::Db(_) | Self::Decode(_) => Status::InternalServerError,
        }
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        if is_unavailable_error(&err) {
            Self::StoreUnavailable(err.to_string())
        } else {
            Self::Db(err)
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    retryable: bool,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.class() == StatusClass::ServerError {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_and_closed_are_distinguishable() {
        let election = Id::new();
        let duplicate = Error::DuplicateVote {
            election,
            voter: Id::new(),
        };
        let closed = Error::ElectionClosed(election);

        assert_ne!(duplicate.status(), closed.status());
        assert_ne!(duplicate.kind(), closed.kind());
    }

    #[test]
    fn only_store_unavailability_is_retryable() {
        assert!(Error::StoreUnavailable("timed out".to_string()).is_retryable());
        assert!(!Error::ElectionClosed(Id::new()).is_retryable());
        assert!(!Error::DuplicateVote {
            election: Id::new(),
            voter: Id::new()
        }
        .is_retryable());
    }
}
