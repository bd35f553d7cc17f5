//! Stateless session tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;

/// Why a request could not be authenticated.
///
/// Callers only ever see one outcome (401); the variants exist for logging.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("no session token supplied")]
    MissingCredential,
    #[error("session token is invalid or expired")]
    InvalidOrExpired,
}

/// Claims embedded in a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username the token was issued to
    pub sub: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration time (seconds since epoch)
    pub exp: i64,
}

impl SessionClaims {
    pub fn subject(&self) -> &str {
        &self.sub
    }
}

/// Issues and verifies signed, time-limited session tokens.
#[derive(Clone)]
pub struct SessionAuthenticator {
    algorithm: Algorithm,
    ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.secret_key.as_bytes();
        Self {
            algorithm: config.algorithm,
            ttl: Duration::hours(config.token_ttl_hours),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token for `username` expiring one TTL from now
    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(username, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = SessionClaims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
    }

    /// Check signature and expiry of a token.
    ///
    /// Every library-level failure (bad signature, malformed token, expired,
    /// wrong algorithm) collapses into [`AuthError::InvalidOrExpired`].
    pub fn verify(&self, token: Option<&str>) -> Result<SessionClaims, AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(reason = ?e.kind(), "Rejected session token");
                AuthError::InvalidOrExpired
            })
    }
}
