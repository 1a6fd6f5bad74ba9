use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
///
/// Transitions are monotonic: `Draft -> Active -> Completed`, nothing else.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Under construction, only visible to admins. Candidates may be added.
    #[field(value = "draft")]
    Draft,
    /// Open for voting within its window.
    #[field(value = "active")]
    Active,
    /// Closed for good; results may be published.
    #[field(value = "completed")]
    Completed,
}

impl ElectionStatus {
    /// Is `self -> target` one of the allowed lifecycle edges?
    pub fn can_transition_to(self, target: ElectionStatus) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Active) | (Self::Active, Self::Completed)
        )
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        Bson::String(status.to_string())
    }
}
