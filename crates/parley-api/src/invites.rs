use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use parley_auth::Identity;
use parley_types::api::{CreateInviteRequest, CreateInviteResponse, InviteListResponse};

use crate::error::ApiResult;
use crate::{AppState, blocking};

/// POST /invites. Administrators only; a missing code is generated and a
/// missing budget means a single use.
pub async fn create_invite(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateInviteRequest>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let code = blocking(move || {
        Ok(st.invites.create(
            identity.user_id,
            req.code.as_deref(),
            req.max_uses.unwrap_or(1),
            req.expires_at,
        )?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(CreateInviteResponse { code })))
}

/// GET /invites. Administrators only.
pub async fn list_invites(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let invites = blocking(move || Ok(st.invites.list(identity.user_id)?)).await?;
    Ok(Json(InviteListResponse { invites }))
}
