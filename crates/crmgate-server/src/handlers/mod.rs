//! Route handlers.

mod auth;
mod contacts;
mod customers;
mod health;

use axum::Router;
use axum::routing::{get, post};
use serde::Deserialize;

use crmgate_core::PageRequest;

use crate::metrics::METRICS_PATH;
use crate::server::AppState;

pub use auth::{LoginRequest, LoginResponse};

pub const LOGIN_PATH: &str = "/api/login";

/// All routes. `/api/login` is mounted only when this server issues tokens.
pub fn routes(with_login: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route(METRICS_PATH, get(health::metrics))
        .route(
            "/api/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route("/api/contacts", post(contacts::create_contact))
        .route("/api/contacts/{customer_id}", get(contacts::list_contacts));

    if with_login {
        router.route(LOGIN_PATH, post(auth::login))
    } else {
        router
    }
}

/// `page`, `pageSize` and `search` query parameters.
///
/// Numbers are taken as text so that an unparsable value behaves like an
/// absent one instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(parse_lenient(&self.page), parse_lenient(&self.page_size))
    }
}

fn parse_lenient(value: &Option<String>) -> Option<i64> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}
