//! Signed bearer tokens (HS256 JWT).

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is invalid: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Token subject is not a user id: {0}")]
    BadSubject(String),

    #[error("Token expiry is out of range")]
    ExpiryOutOfRange,
}

/// Ten years. `Config::validate` rejects anything longer.
pub const MAX_TOKEN_TTL_HOURS: u64 = 87_600;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: TimeDelta,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &str, ttl_hours: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Self::ttl_from_hours(ttl_hours),
        }
    }

    fn ttl_from_hours(ttl_hours: u64) -> TimeDelta {
        i64::try_from(ttl_hours.min(MAX_TOKEN_TTL_HOURS))
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn issue(&self, user_id: i32) -> Result<String, TokenError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<i32, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        data.claims
            .sub
            .parse()
            .map_err(|_| TokenError::BadSubject(data.claims.sub))
    }
}
