use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use crmgate_core::{Customer, NewCustomer, Page};

use super::ListParams;
use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::server::AppState;

pub async fn list_customers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Customer>>, ApiError> {
    let page = state
        .queries
        .list_customers(params.search.as_deref(), params.page_request())
        .await?;
    Ok(Json(page))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    body: Result<Json<NewCustomer>, JsonRejection>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let Json(input) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let customer = state.records.create_customer(input).await?;
    tracing::debug!(sub = %claims.sub, customer.id = customer.id, "customer created by caller");
    Ok((StatusCode::CREATED, Json(customer)))
}
