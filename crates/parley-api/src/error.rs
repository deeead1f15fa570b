use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use parley_auth::AuthError;

/// Everything a handler can fail with, rendered as `{"error": "..."}`.
///
/// Credential and token failures are deliberately indistinguishable on the
/// wire: all of them become `401 unauthorized`. Every permission failure
/// becomes `403 forbidden`. Infrastructure failures are logged here and the
/// client only sees an opaque 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".into()),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".into()),
            Self::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".into()),
            Self::Auth(e) => auth_status(e),
            Self::Internal(_) => internal(),
        }
    }
}

fn auth_status(e: &AuthError) -> (StatusCode, String) {
    match e {
        AuthError::InvalidCredentials
        | AuthError::InvalidSignature
        | AuthError::Expired
        | AuthError::MalformedToken => (StatusCode::UNAUTHORIZED, "unauthorized".into()),
        AuthError::PermissionDenied => (StatusCode::FORBIDDEN, "forbidden".into()),
        AuthError::InviteNotFound => (StatusCode::FORBIDDEN, "invalid invite".into()),
        AuthError::InviteNotUsable => (StatusCode::FORBIDDEN, "invite not usable".into()),
        AuthError::UsernameTaken => (StatusCode::CONFLICT, "username taken".into()),
        AuthError::DuplicateCode => (StatusCode::CONFLICT, "duplicate invite code".into()),
        AuthError::Format | AuthError::UnsupportedAlgorithm(_) | AuthError::Infrastructure(_) => {
            internal()
        }
    }
}

fn internal() -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("request failed: {}", self);
        } else {
            debug!(status = status.as_u16(), "request rejected: {}", self);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
