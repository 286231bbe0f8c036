use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::metrics;
use crate::server::AppState;

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Reports which backends serve the pipeline and whether the shared cache
/// answers. A down cache does not make the server unready: reads fall back to
/// the store of record.
pub async fn readyz(State(state): State<AppState>) -> Json<Value> {
    let cache_available = state.cache.is_available().await;
    Json(json!({
        "status": "ok",
        "cache": {
            "mode": state.cache.mode(),
            "available": cache_available,
        },
        "rate_limit": {
            "enabled": state.config.rate_limit.enabled,
            "backend": state.rate_limiter.backend(),
        },
        "events": {
            "publisher": state.emitter.publisher_name(),
            "in_flight": state.emitter.in_flight(),
        },
    }))
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> Response {
    metrics::set_events_in_flight(state.emitter.in_flight());
    match metrics::render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}
