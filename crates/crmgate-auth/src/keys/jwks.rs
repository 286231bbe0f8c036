//! Rotating public key set fetched from an issuer's JWKS endpoint.
//!
//! The set is loaded by an initial [`JwksKeySet::refresh`] and then refreshed
//! on a fixed interval by [`JwksKeySet::spawn_refresh`]. A token whose `kid` is not in
//! the current set triggers an out-of-band refresh, rate limited by
//! `min_refresh_interval` so that a stream of bogus `kid`s cannot hammer the
//! issuer.
//!
//! A failed refresh leaves the previous keys in place and is reported through
//! the error callback. Keys are only replaced by a successful fetch.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use crmgate_auth::{JwksKeySet, JwksKeySetConfig, JwtVerifier};
//!
//! let url = "https://issuer.example.com/.well-known/jwks.json".parse()?;
//! let keys = Arc::new(
//!     JwksKeySet::new(url, JwksKeySetConfig::default())?
//!         .with_error_handler(|err| tracing::warn!(error = %err, "JWKS refresh failed")),
//! );
//! keys.refresh().await.ok();
//! let refresher = keys.spawn_refresh();
//! let verifier = JwtVerifier::new(keys.clone());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::jwk::{
    AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use super::{KeyResolver, ResolvedKey};
use crate::error::AuthError;

#[derive(Debug, Clone)]
pub struct JwksKeySetConfig {
    /// Interval between background refreshes (default: 5 minutes).
    pub refresh_interval: Duration,

    /// Per-fetch HTTP timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Minimum spacing of refreshes triggered by an unknown `kid`
    /// (default: 30 seconds).
    pub min_refresh_interval: Duration,
}

impl Default for JwksKeySetConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            min_refresh_interval: Duration::from_secs(30),
        }
    }
}

/// Errors raised while fetching a key set.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: status {0}")]
    Http(u16),

    #[error("Failed to parse JWKS: {0}")]
    Parse(String),

    /// The document parsed but contained no usable signing key.
    #[error("No signing keys found in JWKS")]
    NoSigningKeys,
}

type ErrorHandler = Arc<dyn Fn(&JwksError) + Send + Sync>;

pub struct JwksKeySet {
    url: Url,
    http_client: reqwest::Client,
    keys: ArcSwap<HashMap<String, ResolvedKey>>,
    config: JwksKeySetConfig,
    /// Time of the last fetch attempt; also serializes fetches.
    last_fetch: Mutex<Option<Instant>>,
    on_error: Option<ErrorHandler>,
}

impl JwksKeySet {
    /// Creates an empty key set. Call [`refresh`](Self::refresh) to load it.
    pub fn new(url: Url, config: JwksKeySetConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url,
            http_client,
            keys: ArcSwap::from_pointee(HashMap::new()),
            config,
            last_fetch: Mutex::new(None),
            on_error: None,
        })
    }

    /// Installs a callback invoked on every failed refresh.
    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&JwksError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Number of keys currently usable.
    pub fn len(&self) -> usize {
        self.keys.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.load().is_empty()
    }

    /// Fetches the key set now, replacing the current keys on success.
    pub async fn refresh(&self) -> Result<usize, JwksError> {
        let mut last_fetch = self.last_fetch.lock().await;
        self.refresh_locked(&mut last_fetch).await
    }

    async fn refresh_locked(&self, last_fetch: &mut Option<Instant>) -> Result<usize, JwksError> {
        *last_fetch = Some(Instant::now());
        match self.fetch().await {
            Ok(keys) => {
                let count = keys.len();
                self.keys.store(Arc::new(keys));
                tracing::debug!(url = %self.url, keys = count, "JWKS refreshed");
                Ok(count)
            }
            Err(err) => {
                tracing::warn!(url = %self.url, error = %err, "JWKS refresh failed, keeping previous keys");
                if let Some(handler) = &self.on_error {
                    handler(&err);
                }
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<HashMap<String, ResolvedKey>, JwksError> {
        let response = self
            .http_client
            .get(self.url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| JwksError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksError::Http(response.status().as_u16()));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| JwksError::Parse(e.to_string()))?;

        let keys: HashMap<String, ResolvedKey> = jwks
            .keys
            .iter()
            .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                let algorithm = jwk_algorithm(jwk)?;
                let key = DecodingKey::from_jwk(jwk).ok()?;
                Some((kid, ResolvedKey { key, algorithm }))
            })
            .collect();

        if keys.is_empty() {
            return Err(JwksError::NoSigningKeys);
        }
        Ok(keys)
    }

    /// Starts the periodic refresh loop. The loop ends once the key set is
    /// dropped.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(key_set) = weak.upgrade() else {
                    break;
                };
                let _ = key_set.refresh().await;
            }
        })
    }

    fn lookup(&self, kid: &str) -> Option<ResolvedKey> {
        self.keys.load().get(kid).cloned()
    }
}

#[async_trait]
impl KeyResolver for JwksKeySet {
    async fn resolve(&self, kid: Option<&str>) -> Result<ResolvedKey, AuthError> {
        let kid = kid.ok_or_else(|| AuthError::malformed("token header has no kid"))?;

        if let Some(key) = self.lookup(kid) {
            return Ok(key);
        }

        let mut last_fetch = self.last_fetch.lock().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(key) = self.lookup(kid) {
            return Ok(key);
        }
        let due = last_fetch
            .is_none_or(|at| at.elapsed() >= self.config.min_refresh_interval);
        if due {
            tracing::debug!(kid, "Unknown kid, refreshing JWKS");
            let _ = self.refresh_locked(&mut last_fetch).await;
        }
        drop(last_fetch);

        self.lookup(kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }
}

/// Picks the verification algorithm for a JWK: the declared `alg`, else the
/// usual default for its key type. Symmetric keys are never accepted.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    if let Some(alg) = &jwk.common.key_algorithm {
        return match alg {
            KeyAlgorithm::RS256 => Some(Algorithm::RS256),
            KeyAlgorithm::RS384 => Some(Algorithm::RS384),
            KeyAlgorithm::RS512 => Some(Algorithm::RS512),
            KeyAlgorithm::ES256 => Some(Algorithm::ES256),
            KeyAlgorithm::ES384 => Some(Algorithm::ES384),
            KeyAlgorithm::PS256 => Some(Algorithm::PS256),
            KeyAlgorithm::PS384 => Some(Algorithm::PS384),
            KeyAlgorithm::PS512 => Some(Algorithm::PS512),
            KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
            _ => None,
        };
    }
    match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(params) => match params.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}
