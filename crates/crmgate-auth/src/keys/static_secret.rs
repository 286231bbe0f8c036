use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};

use super::{KeyResolver, ResolvedKey};
use crate::error::AuthError;

/// A single pre-shared HS256 secret. Any `kid` in the token is ignored.
pub struct StaticSecret {
    key: ResolvedKey,
}

impl StaticSecret {
    pub fn new(secret: &[u8]) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::config("signing secret must not be empty"));
        }
        Ok(Self {
            key: ResolvedKey {
                key: DecodingKey::from_secret(secret),
                algorithm: Algorithm::HS256,
            },
        })
    }
}

#[async_trait]
impl KeyResolver for StaticSecret {
    async fn resolve(&self, _kid: Option<&str>) -> Result<ResolvedKey, AuthError> {
        Ok(self.key.clone())
    }
}
