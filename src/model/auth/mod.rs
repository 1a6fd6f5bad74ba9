mod identity;
mod token;

pub use identity::VoterIdentity;
pub use token::{Admin, AuthToken, Rights, User, Voter, AUTHORIZATION_HEADER};
