//! HS256 token issuance for the login route.

use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Map;
use time::OffsetDateTime;

use crate::claims::Claims;
use crate::error::AuthError;

#[derive(Clone)]
pub struct TokenSigner {
    key: EncodingKey,
    ttl: Duration,
    issuer: Option<String>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::config("signing secret must not be empty"));
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret),
            ttl,
            issuer: None,
        })
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    /// Issues a token for `subject` that expires after the configured TTL.
    pub fn issue(&self, subject: &str, email: &str) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        let claims = Claims {
            sub: subject.to_string(),
            exp: now + self.ttl.as_secs(),
            iat: Some(now),
            iss: self.issuer.clone(),
            email: Some(email.to_string()),
            extra: Map::new(),
        };
        encode(&Header::default(), &claims, &self.key).map_err(|e| AuthError::Signing(e.to_string()))
    }
}
