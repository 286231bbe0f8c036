//! Builds the verifier (and, for the static strategy, the signer) from config.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{AuthConfig, KeyStrategy};
use crate::error::AuthError;
use crate::keys::KeyResolver;
use crate::keys::jwks::{JwksKeySet, JwksKeySetConfig};
use crate::keys::static_secret::StaticSecret;
use crate::signer::TokenSigner;
use crate::verifier::{JwtVerifier, TokenVerifier};

type KeySetup = (
    Arc<dyn KeyResolver>,
    Option<TokenSigner>,
    Option<JoinHandle<()>>,
);

pub struct AuthSetup {
    pub verifier: Arc<dyn TokenVerifier>,
    /// Present only with the static strategy; the login route needs it.
    pub signer: Option<TokenSigner>,
    /// Background JWKS refresh loop, if any.
    pub refresh_task: Option<JoinHandle<()>>,
}

/// Wires up authentication. With the JWKS strategy the initial fetch is
/// attempted here; a failure is logged and tokens are rejected until a later
/// refresh succeeds.
pub async fn setup(config: &AuthConfig) -> Result<AuthSetup, AuthError> {
    let (resolver, signer, refresh_task): KeySetup = match config.strategy {
        KeyStrategy::StaticSecret => {
            let secret = config.resolve_secret()?;
            let resolver = StaticSecret::new(secret.as_bytes())?;
            let signer = TokenSigner::new(secret.as_bytes(), config.token_ttl)?
                .with_issuer(config.issuer.clone());
            let resolver: Arc<dyn KeyResolver> = Arc::new(resolver);
            (resolver, Some(signer), None)
        }
        KeyStrategy::Jwks => {
            let url = config
                .jwks
                .url
                .clone()
                .ok_or_else(|| AuthError::config("auth.jwks.url is not set"))?;
            let key_set = JwksKeySet::new(
                url.clone(),
                JwksKeySetConfig {
                    refresh_interval: config.jwks.refresh_interval,
                    request_timeout: config.jwks.request_timeout,
                    min_refresh_interval: config.jwks.min_refresh_interval,
                },
            )?
            .with_error_handler(|err| {
                tracing::error!(error = %err, "JWKS refresh failed");
            });
            let key_set = Arc::new(key_set);
            match key_set.refresh().await {
                Ok(count) => tracing::info!(%url, keys = count, "JWKS loaded"),
                Err(_) => tracing::warn!(%url, "Starting without JWKS keys"),
            }
            let task = key_set.spawn_refresh();
            let resolver: Arc<dyn KeyResolver> = key_set;
            (resolver, None, Some(task))
        }
    };

    let verifier = JwtVerifier::new(resolver)
        .with_leeway(config.leeway.as_secs())
        .with_issuer(config.issuer.clone())
        .with_audience(config.audience.clone());

    Ok(AuthSetup {
        verifier: Arc::new(verifier),
        signer,
        refresh_task,
    })
}
