use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use parley_types::api::{LoginRequest, RegisterRequest};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

pub(crate) const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
pub(crate) const MIN_PASSWORD_LEN: usize = 6;
pub(crate) const PIN_LEN: std::ops::RangeInclusive<usize> = 4..=10;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.invite_code.trim().is_empty() {
        return Err(ApiError::bad_request("invite code is required"));
    }
    if !USERNAME_LEN.contains(&req.username.chars().count()) {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if req.display_name.trim().is_empty() {
        return Err(ApiError::bad_request("display name is required"));
    }
    validate_secrets(&req.password, &req.pin)?;

    let session = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.username.is_empty() || req.password.is_empty() || req.pin.is_empty() {
        return Err(ApiError::bad_request("username, password and pin are required"));
    }

    let session = state.auth.login(req).await?;
    Ok(Json(session))
}

/// Shape rules for a new password and PIN.
pub(crate) fn validate_secrets(password: &str, pin: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("password must be at least 6 characters"));
    }
    if !PIN_LEN.contains(&pin.chars().count()) {
        return Err(ApiError::bad_request("pin must be 4 to 10 characters"));
    }
    Ok(())
}
