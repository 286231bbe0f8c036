//! Authentication errors.

/// Errors raised while verifying or issuing credentials.
///
/// Everything that makes a presented credential unacceptable reports
/// [`AuthError::is_unauthenticated`]; callers must not expose the detail.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token expired")]
    Expired,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    /// The token names a key the key source does not have, even after refresh.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// Email/password pair did not match a user.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("password hash error: {0}")]
    PasswordHash(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// `true` when the caller's credential was rejected (as opposed to a
    /// server-side failure).
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential
                | Self::Malformed(_)
                | Self::Expired
                | Self::InvalidSignature
                | Self::InvalidClaims(_)
                | Self::UnknownKey(_)
                | Self::InvalidCredentials
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::InvalidClaims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::InvalidKey(err.to_string()),
            _ => Self::Malformed(err.to_string()),
        }
    }
}
