use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use parley_auth::Identity;
use parley_types::api::{CreateChatRequest, CreateChatResponse, OkResponse};

use crate::error::ApiResult;
use crate::{AppState, blocking};

/// POST /chats. The caller is always a member; listed ids that do not
/// name a user are skipped.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = Uuid::new_v4();
    let db = state.db.clone();
    let creator = identity.user_id.to_string();
    let members: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();
    let cid = chat_id.to_string();

    blocking(move || Ok(db.create_chat(&cid, &req.title, req.is_group, &creator, &members)?)).await?;

    info!(chat_id = %chat_id, created_by = %identity.user_id, "chat created");
    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id })))
}

/// DELETE /chats/{chat_id}/clear. Removes every message and attachment
/// file in the chat. Members only.
pub async fn clear_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let paths = blocking(move || {
        st.guard.require_member(chat_id, identity.user_id)?;
        Ok(st.db.clear_chat(&chat_id.to_string())?)
    })
    .await?;

    crate::attachments::remove_files(&paths).await;
    info!(chat_id = %chat_id, files = paths.len(), "chat cleared");
    Ok(Json(OkResponse::ok()))
}
