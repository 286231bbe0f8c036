use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use crmgate_auth::password;
use crmgate_storage::UserStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Exchanges email and password for a bearer token.
///
/// Unknown email and wrong password produce the same answer, after the same
/// amount of hashing work.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let signer = state
        .signer
        .clone()
        .ok_or_else(|| ApiError::internal("login called without a token signer"))?;

    let user = state
        .store
        .find_user_by_email(request.email.trim())
        .await?;

    let password_ok = tokio::task::spawn_blocking({
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        move || match stored_hash {
            Some(hash) => password::verify_password(&request.password, &hash),
            None => {
                password::verify_against_placeholder(&request.password);
                Ok(false)
            }
        }
    })
    .await
    .map_err(|e| ApiError::internal(format!("password check task failed: {e}")))?
    .map_err(|e| ApiError::internal(format!("stored password hash unreadable: {e}")))?;

    let Some(user) = user.filter(|_| password_ok) else {
        tracing::info!("login rejected");
        return Err(ApiError::unauthenticated(INVALID_CREDENTIALS));
    };

    let token = signer
        .issue(&user.id.to_string(), &user.email)
        .map_err(|e| ApiError::internal(format!("token signing failed: {e}")))?;
    tracing::info!(user.id = user.id, "login succeeded");
    Ok(Json(LoginResponse { token }))
}
