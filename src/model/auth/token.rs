use std::fmt::Display;
use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{api::id::ApiId, mongodb::Id};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// A kind of user that can present a token.
pub trait User {
    const RIGHTS: Rights;
}

/// Marker for tokens issued to voters.
pub struct Voter;

/// Marker for tokens issued to election administrators.
pub struct Admin;

impl User for Voter {
    const RIGHTS: Rights = Rights::Voter;
}

impl User for Admin {
    const RIGHTS: Rights = Rights::Admin;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rights {
    Voter,
    Admin,
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}

/// An authentication token representing a specific user with specific rights.
///
/// Tokens are issued by the identity provider as HS256 JWTs and presented as
/// `Authorization: Bearer <jwt>`.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    #[serde(rename = "sub")]
    pub id: ApiId,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    /// Whether the user completed one-time-code verification.
    #[serde(rename = "vfd", default)]
    pub verified: bool,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Create a new [`AuthToken`] for the given user ID, with the correct rights for that user type.
    pub fn new(id: Id, verified: bool) -> Self {
        Self {
            id: id.into(),
            rights: U::RIGHTS,
            verified,
            phantom: PhantomData,
        }
    }

    /// Sign this token, valid until `expire_at`.
    pub fn encode(self, config: &Config, expire_at: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            token: self,
            expire_at,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the bearer header and verify that it has the
    /// correct rights for this user type.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    Error::Unauthenticated("token verification is not configured".to_string()),
                ))
            }
        };

        let bearer = req
            .headers()
            .get_one(AUTHORIZATION_HEADER)
            .and_then(|value| value.strip_prefix(BEARER_PREFIX));
        let bearer = match bearer {
            Some(bearer) => bearer,
            None => {
                return Outcome::Error((
                    Status::Unauthorized,
                    Error::Unauthenticated("missing bearer token".to_string()),
                ))
            }
        };

        let token = match Self::decode(bearer, config) {
            Ok(token) => token,
            Err(e) => {
                return Outcome::Error((Status::Unauthorized, Error::Unauthenticated(e.to_string())))
            }
        };

        if !token.permits(U::RIGHTS) {
            return Outcome::Error((
                Status::Forbidden,
                Error::Unauthenticated(format!("token does not carry {} rights", U::RIGHTS)),
            ));
        }

        Outcome::Success(token)
    }
}
