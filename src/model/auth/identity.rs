use crate::model::{
    auth::{AuthToken, Voter},
    mongodb::Id,
};

/// A voter as vouched for by the identity provider.
///
/// The identity subsystem owns voters; all the voting core ever learns about
/// one is its ID and whether it completed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoterIdentity {
    pub id: Id,
    pub verified: bool,
}

impl VoterIdentity {
    pub fn verified(id: Id) -> Self {
        Self { id, verified: true }
    }

    pub fn unverified(id: Id) -> Self {
        Self {
            id,
            verified: false,
        }
    }
}

impl From<AuthToken<Voter>> for VoterIdentity {
    fn from(token: AuthToken<Voter>) -> Self {
        Self {
            id: token.id.into(),
            verified: token.verified,
        }
    }
}
