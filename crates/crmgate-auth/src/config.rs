//! Authentication configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Where verification keys come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// One pre-shared HS256 secret. Enables the login route.
    #[default]
    StaticSecret,
    /// Public keys published by an external issuer.
    Jwks,
}

/// # Example (TOML)
///
/// ```toml
/// [auth]
/// strategy = "jwks"
/// issuer = "https://id.example.com/"
///
/// [auth.jwks]
/// url = "https://id.example.com/.well-known/jwks.json"
/// refresh_interval = "5m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub strategy: KeyStrategy,

    /// HS256 secret for the static strategy.
    pub secret: String,

    /// File holding the secret (Docker secrets style). Takes precedence over
    /// `secret`.
    pub secret_file: Option<PathBuf>,

    pub jwks: JwksSettings,

    /// Required `iss`, if any. Also stamped on issued tokens.
    pub issuer: Option<String>,

    /// Required `aud`, if any.
    pub audience: Option<String>,

    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Lifetime of tokens issued by the login route.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Paths served without a bearer token. Matched exactly or as a prefix
    /// followed by `/`.
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: KeyStrategy::StaticSecret,
            secret: String::new(),
            secret_file: None,
            jwks: JwksSettings::default(),
            issuer: None,
            audience: None,
            leeway: Duration::ZERO,
            token_ttl: Duration::from_secs(24 * 3600),
            public_paths: vec![
                "/healthz".to_string(),
                "/readyz".to_string(),
                "/api/login".to_string(),
                "/metrics".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksSettings {
    pub url: Option<Url>,

    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub min_refresh_interval: Duration,
}

impl Default for JwksSettings {
    fn default() -> Self {
        Self {
            url: None,
            refresh_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            min_refresh_interval: Duration::from_secs(30),
        }
    }
}

impl AuthConfig {
    /// The HS256 secret, read from `secret_file` when set.
    pub fn resolve_secret(&self) -> Result<String, AuthError> {
        let secret = match &self.secret_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                AuthError::config(format!("failed to read secret file {}: {e}", path.display()))
            })?,
            None => self.secret.clone(),
        };
        Ok(secret.trim().to_string())
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public| {
            path == public
                || path
                    .strip_prefix(public.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.strategy {
            KeyStrategy::StaticSecret => {
                if self.secret_file.is_none() && self.secret.trim().is_empty() {
                    return Err(
                        "auth.secret (or auth.secret_file) is required for the static_secret strategy"
                            .into(),
                    );
                }
            }
            KeyStrategy::Jwks => {
                if self.jwks.url.is_none() {
                    return Err("auth.jwks.url is required for the jwks strategy".into());
                }
                if self.jwks.refresh_interval.is_zero() || self.jwks.request_timeout.is_zero() {
                    return Err("auth.jwks intervals must be greater than zero".into());
                }
            }
        }
        if self.token_ttl.is_zero() {
            return Err("auth.token_ttl must be greater than zero".into());
        }
        Ok(())
    }
}
