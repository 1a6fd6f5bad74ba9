use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{stored_precision, ElectionStatus},
    mongodb::Id,
};

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Lifecycle status.
    pub status: ElectionStatus,
    /// Voting opens at this time (inclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes at this time (exclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// When the election was created.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ElectionCore {
    /// Create a new draft election.
    pub fn new(
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title,
            status: ElectionStatus::Draft,
            start_time,
            end_time,
            created_at,
        }
    }

    /// Does the election window `[start_time, end_time)` contain `now`?
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Election {
    /// Give a new election its ID.
    pub fn from_new(election: NewElection) -> Self {
        Self {
            id: Id::new(),
            election: ElectionCore {
                start_time: stored_precision(election.start_time),
                end_time: stored_precision(election.end_time),
                created_at: stored_precision(election.created_at),
                ..election
            },
        }
    }
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl ElectionCore {
        /// A draft whose window is open right now: `now ± 1h`.
        pub fn current_example() -> Self {
            let now = Utc::now();
            Self::new(
                "Student Union President".to_string(),
                now - Duration::hours(1),
                now + Duration::hours(1),
                now - Duration::days(1),
            )
        }

        /// A draft whose window starts tomorrow.
        pub fn future_example() -> Self {
            let now = Utc::now();
            Self::new(
                "Treasurer".to_string(),
                now + Duration::days(1),
                now + Duration::days(2),
                now,
            )
        }

        /// A draft whose window closed yesterday.
        pub fn past_example() -> Self {
            let now = Utc::now();
            Self::new(
                "Returning Officer".to_string(),
                now - Duration::days(2),
                now - Duration::days(1),
                now - Duration::days(3),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn window_is_half_open() {
        let election = ElectionCore::current_example();
        assert!(election.window_contains(election.start_time));
        assert!(election.window_contains(election.end_time - Duration::milliseconds(1)));
        assert!(!election.window_contains(election.end_time));
        assert!(!election.window_contains(election.start_time - Duration::milliseconds(1)));
    }
}
