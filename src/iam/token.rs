//! Signed session tokens.
//!
//! Tokens are HS256 JWTs carrying the user id, the user's `version` at issue
//! time, the role, whether the session came from a fresh OTP verification and
//! the expiry. The version lets mutations reject tokens minted before a
//! concurrent change to the same user.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Role, User};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_version: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verified: bool,
    #[serde(default)]
    pub role: Option<Role>,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token carries no user id")]
    MissingUserId,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &"***")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Mint a token for the user as it is now.
    ///
    /// # Errors
    /// Returns an error if the expiry overflows or signing fails.
    pub fn issue(&self, user: &User, verified: bool) -> Result<String> {
        let exp = Utc::now()
            .checked_add_signed(self.ttl)
            .context("session token expiry is out of range")?;
        let claims = Claims {
            user_id: user.id.to_string(),
            user_version: user.version,
            verified,
            role: Some(user.role),
            exp: exp.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("could not sign the session token")
    }

    /// Check signature and expiry, then hand back the claims verbatim.
    ///
    /// # Errors
    /// Returns a `TokenError` for a bad signature, an expired token or an empty user id.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err),
            })?;

        if claims.user_id.trim().is_empty() {
            return Err(TokenError::MissingUserId);
        }

        Ok(claims)
    }
}
