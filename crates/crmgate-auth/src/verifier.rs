//! Token verification.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Validation, decode, decode_header};

use crate::claims::Claims;
use crate::error::AuthError;
use crate::keys::KeyResolver;

/// Validates a bearer credential and returns its claims.
///
/// Implementations are pure: verifying a token never changes state visible to
/// other requests (a key set may refresh itself, but that is not observable
/// through the result).
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `credential` is the bare token, without the `Bearer ` prefix.
    async fn verify(&self, credential: &str) -> Result<Claims, AuthError>;
}

/// JWT verifier over any [`KeyResolver`].
pub struct JwtVerifier {
    resolver: Arc<dyn KeyResolver>,
    leeway_secs: u64,
    issuer: Option<String>,
    audience: Option<String>,
}

impl JwtVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            leeway_secs: 0,
            issuer: None,
            audience: None,
        }
    }

    /// Clock skew tolerated on `exp`/`nbf`.
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> Result<Claims, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let header = decode_header(credential)?;
        let resolved = self.resolver.resolve(header.kid.as_deref()).await?;
        if header.alg != resolved.algorithm {
            return Err(AuthError::malformed(format!(
                "token algorithm {:?} does not match key algorithm {:?}",
                header.alg, resolved.algorithm
            )));
        }

        let mut validation = Validation::new(resolved.algorithm);
        validation.leeway = self.leeway_secs;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Claims>(credential, &resolved.key, &validation)?;
        Ok(data.claims)
    }
}
