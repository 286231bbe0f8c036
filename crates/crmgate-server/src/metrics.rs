//! Prometheus metrics for crmgate.
//!
//! Counters for every pipeline decision (limiter, authentication, cache,
//! event emission) plus per-route HTTP request counts and latency. The
//! recorder is installed once per process and rendered at `/metrics`.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const METRICS_PATH: &str = "/metrics";

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Pipeline decisions
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "rate_limit_decisions_total";
    pub const AUTH_REJECTIONS_TOTAL: &str = "auth_rejections_total";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";

    // Event metrics
    pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
    pub const EVENTS_IN_FLIGHT: &str = "events_in_flight";
}

/// Installs the Prometheus recorder.
///
/// Returns `true` if this call installed it, `false` if it was already
/// installed (several servers in one process share the recorder).
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle was set concurrently");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Renders all metrics in Prometheus text format, `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP
// =============================================================================

/// `route` is the matched route template, never the raw path.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOutcome {
    Allowed,
    Denied,
    /// Counter store failed; the configured policy decided.
    BackendError,
}

impl LimitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitOutcome::Allowed => "allowed",
            LimitOutcome::Denied => "denied",
            LimitOutcome::BackendError => "backend_error",
        }
    }
}

pub fn record_rate_limit(limiter: &'static str, outcome: LimitOutcome) {
    counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "limiter" => limiter,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// `reason` is `missing_token` or `invalid_token`.
pub fn record_auth_rejection(reason: &'static str) {
    counter!(names::AUTH_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

// =============================================================================
// Cache
// =============================================================================

pub fn record_cache_hit(operation: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "operation" => operation).increment(1);
}

pub fn record_cache_miss(operation: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "operation" => operation).increment(1);
}

/// `op` is `get` or `set`.
pub fn record_cache_error(op: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "op" => op).increment(1);
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Ok,
    Failed,
    Timeout,
    Panicked,
    /// Never handed to the publisher because the emitter was saturated.
    Dropped,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Ok => "ok",
            PublishOutcome::Failed => "failed",
            PublishOutcome::Timeout => "timeout",
            PublishOutcome::Panicked => "panicked",
            PublishOutcome::Dropped => "dropped",
        }
    }
}

pub fn record_publish(publisher: &'static str, outcome: PublishOutcome) {
    counter!(
        names::EVENTS_PUBLISHED_TOTAL,
        "publisher" => publisher,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn set_events_in_flight(count: usize) {
    gauge!(names::EVENTS_IN_FLIGHT).set(count as f64);
}
