//! Key material sources for [`JwtVerifier`](crate::JwtVerifier).

pub mod jwks;
pub mod static_secret;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::error::AuthError;

/// A verification key together with the one algorithm it may be used with.
#[derive(Clone)]
pub struct ResolvedKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Supplies the key that should verify a token, given the `kid` from its
/// header.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError::UnknownKey` when no key matches `kid`.
    async fn resolve(&self, kid: Option<&str>) -> Result<ResolvedKey, AuthError>;
}
