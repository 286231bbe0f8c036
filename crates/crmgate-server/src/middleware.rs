use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, MatchedPath, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crmgate_auth::Claims;
use uuid::Uuid;

use crate::config::BackendFailurePolicy;
use crate::error::ApiError;
use crate::identity::client_identity;
use crate::metrics::{self, LimitOutcome};
use crate::pipeline::{self, Stage, select_limiter};
use crate::rate_limit::Decision;
use crate::server::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Request id stored in request extensions for logging.
#[derive(Debug, Clone)]
pub struct RequestId(HeaderValue);

impl RequestId {
    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or("")
    }
}

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    // Preserve the caller's request id, otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .filter(|v| v.to_str().is_ok_and(|s| !s.is_empty()))
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("unknown"));

    req.extensions_mut().insert(RequestId(req_id_value.clone()));

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

/// Counts every request by matched route and status, rejections included.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let res = next.run(req).await;
    metrics::record_http_request(
        method.as_str(),
        &route,
        res.status().as_u16(),
        started.elapsed(),
    );
    res
}

/// Counts the request against its limiter and rejects it with 429 when the
/// window is exhausted.
pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let config = &state.config.rate_limit;
    let path = req.uri().path();
    if !config.enabled || config.is_exempt(path) {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(req.headers(), peer, config.trust_forwarded_for);
    let limiter = select_limiter(req.method(), path);

    match state
        .rate_limiter
        .allow(&identity, limiter.as_str(), limiter.limit(config))
        .await
    {
        Ok(Decision::Allowed {
            limit, remaining, ..
        }) => {
            metrics::record_rate_limit(limiter.as_str(), LimitOutcome::Allowed);
            pipeline::record_stage(Stage::RateLimitChecked);
            let mut res = next.run(req).await;
            let headers = res.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
            res
        }
        Ok(Decision::Denied { retry_after, .. }) => {
            tracing::warn!(
                identity = %identity,
                limiter = limiter.as_str(),
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );
            metrics::record_rate_limit(limiter.as_str(), LimitOutcome::Denied);
            pipeline::record_rejected();
            ApiError::RateLimited { retry_after }.into_response()
        }
        Err(err) => {
            metrics::record_rate_limit(limiter.as_str(), LimitOutcome::BackendError);
            match config.on_backend_error {
                Some(BackendFailurePolicy::Allow) => {
                    tracing::warn!(
                        error = %err,
                        identity = %identity,
                        "rate limit store unavailable, allowing request"
                    );
                    pipeline::record_stage(Stage::RateLimitChecked);
                    next.run(req).await
                }
                Some(BackendFailurePolicy::Deny) => {
                    tracing::warn!(
                        error = %err,
                        identity = %identity,
                        "rate limit store unavailable, denying request"
                    );
                    pipeline::record_rejected();
                    backend_unavailable_response()
                }
                // The builder refuses a fallible store without a policy.
                None => {
                    tracing::error!(
                        error = %err,
                        identity = %identity,
                        "rate limit store failed with no on_backend_error policy, denying request"
                    );
                    pipeline::record_rejected();
                    backend_unavailable_response()
                }
            }
        }
    }
}

fn backend_unavailable_response() -> Response {
    ApiError::RateLimited {
        retry_after: Duration::from_secs(1),
    }
    .into_response()
}

/// Verifies the bearer token on non-public paths and hands the verified
/// [`Claims`] to the handler through request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if state.config.auth.is_public_path(req.uri().path()) {
        pipeline::record_stage(Stage::Dispatched);
        let res = next.run(req).await;
        pipeline::record_responded();
        return res;
    }

    let token = match bearer_token(req.headers()) {
        Ok(token) => token,
        Err(err) => {
            metrics::record_auth_rejection("missing_token");
            pipeline::record_rejected();
            return err.into_response();
        }
    };

    match state.verifier.verify(token).await {
        Ok(claims) => {
            pipeline::record_stage(Stage::Authenticated);
            tracing::debug!(sub = %claims.sub, "token verified");
            req.extensions_mut().insert(claims);
        }
        Err(err) => {
            tracing::warn!(error = %err, "bearer token rejected");
            metrics::record_auth_rejection("invalid_token");
            pipeline::record_rejected();
            return ApiError::unauthenticated("Invalid or expired token").into_response();
        }
    }

    pipeline::record_stage(Stage::Dispatched);
    let res = next.run(req).await;
    pipeline::record_responded();
    res
}

/// Extracts the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthenticated("Authentication required"))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthenticated("Invalid Authorization header format"))
}

/// Verified claims of the caller. Only available behind [`authenticate`].
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| ApiError::unauthenticated("Authentication required"))
    }
}
