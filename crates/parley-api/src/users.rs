use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use parley_auth::Identity;
use parley_types::api::{ChangeSecretsRequest, MeResponse, OkResponse};

use crate::auth::validate_secrets;
use crate::error::{ApiError, ApiResult};
use crate::{AppState, MAX_UPLOAD_SIZE, blocking};

const AVATAR_URL: &str = "/api/v1/users/me/avatar";

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let uid = identity.user_id.to_string();
    let user = blocking(move || Ok(db.get_user_by_id(&uid)?))
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(MeResponse {
        id: identity.user_id,
        username: user.username,
        display_name: user.display_name,
        public_key: user.public_key,
        is_admin: user.is_admin,
        avatar_url: user.avatar_path.map(|_| AVATAR_URL.to_string()),
        last_active_at: user.last_active_at,
    }))
}

/// PUT /users/me/password. Replaces both the password and the PIN; the
/// current pair must be presented.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ChangeSecretsRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_secrets(&req.new_password, &req.new_pin)?;
    state.auth.change_secrets(identity.user_id, req).await?;
    Ok(Json(OkResponse::ok()))
}

/// POST /users/me/avatar. Raw image bytes in the body.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("avatar required"));
    }
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(ApiError::PayloadTooLarge);
    }

    let dir = state.data_dir.join("avatars");
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create avatar directory {}: {}", dir.display(), e);
        anyhow::Error::from(e)
    })?;

    let path = dir.join(identity.user_id.to_string());
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create avatar {}: {}", path.display(), e);
        anyhow::Error::from(e)
    })?;
    file.write_all(&bytes).await.map_err(anyhow::Error::from)?;

    let db = state.db.clone();
    let uid = identity.user_id.to_string();
    let stored = path.to_string_lossy().into_owned();
    blocking(move || Ok(db.set_avatar_path(&uid, &stored, Utc::now())?)).await?;

    info!(user_id = %identity.user_id, size = bytes.len(), "avatar updated");
    Ok(Json(serde_json::json!({ "avatarUrl": AVATAR_URL })))
}

pub async fn get_avatar(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let uid = identity.user_id.to_string();
    let path = blocking(move || Ok(db.get_user_by_id(&uid)?))
        .await?
        .and_then(|user| user.avatar_path)
        .ok_or(ApiError::NotFound)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        error!("Failed to read avatar {}: {}", path, e);
        ApiError::NotFound
    })?;

    Ok((crate::attachments::download_headers(""), bytes))
}
