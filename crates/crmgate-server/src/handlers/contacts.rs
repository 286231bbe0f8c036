use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use crmgate_core::{Contact, NewContact, Page, ValidationError};

use super::ListParams;
use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::server::AppState;

pub async fn list_contacts(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Contact>>, ApiError> {
    let customer_id = customer_id
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ValidationError::InvalidCustomerId)?;

    let page = state
        .queries
        .list_contacts(customer_id, params.page_request())
        .await?;
    Ok(Json(page))
}

pub async fn create_contact(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    body: Result<Json<NewContact>, JsonRejection>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let Json(input) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let contact = state.records.create_contact(input).await?;
    tracing::debug!(sub = %claims.sub, contact.id = contact.id, "contact created by caller");
    Ok((StatusCode::CREATED, Json(contact)))
}
