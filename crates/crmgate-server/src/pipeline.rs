//! Request pipeline composition.
//!
//! Every request passes, outermost first:
//!
//! ```text
//! request id -> trace span -> timeout -> rate limit -> authentication -> handler
//! ```
//!
//! A request rejected by the rate limiter never reaches token verification,
//! and one rejected by either never reaches its handler. The timeout wraps
//! both checks, so a request that times out while waiting on the counter store
//! or the key source is dropped before dispatch.
//!
//! The request span carries `pipeline.stage` (the last stage reached) and
//! `pipeline.outcome` (`responded` or `rejected`).

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, Request, Response};
use axum::middleware;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::RateLimitConfig;
use crate::handlers::LOGIN_PATH;
use crate::middleware as app_middleware;
use crate::rate_limit::Limit;
use crate::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RateLimitChecked,
    Authenticated,
    Dispatched,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RateLimitChecked => "rate_limit_checked",
            Stage::Authenticated => "authenticated",
            Stage::Dispatched => "dispatched",
        }
    }
}

/// Marks the current request span as having reached `stage`.
pub fn record_stage(stage: Stage) {
    tracing::Span::current().record("pipeline.stage", stage.as_str());
}

/// Marks the current request as refused by the pipeline itself.
pub fn record_rejected() {
    tracing::Span::current().record("pipeline.outcome", "rejected");
}

pub fn record_responded() {
    tracing::Span::current().record("pipeline.outcome", "responded");
}

/// Which configured limit a request counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterName {
    Default,
    Login,
    Writes,
}

impl LimiterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterName::Default => "default",
            LimiterName::Login => "login",
            LimiterName::Writes => "writes",
        }
    }

    pub fn limit(&self, config: &RateLimitConfig) -> Limit {
        match self {
            LimiterName::Default => config.default,
            LimiterName::Login => config.login,
            LimiterName::Writes => config.writes,
        }
    }
}

/// Login attempts get their own limit; other mutations share `writes`.
pub fn select_limiter(method: &Method, path: &str) -> LimiterName {
    if path == LOGIN_PATH {
        return LimiterName::Login;
    }
    match *method {
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE => LimiterName::Writes,
        _ => LimiterName::Default,
    }
}

/// Wraps `routes` in the pipeline and binds the state.
pub fn apply(routes: Router<AppState>, state: AppState) -> Router {
    let request_timeout = state.config.server.request_timeout();
    let body_limit = state.config.server.body_limit_bytes;

    routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authenticate,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit,
        ))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<app_middleware::RequestId>()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        pipeline.stage = "received",
                        pipeline.outcome = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::track_metrics))
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}
