use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use parley_auth::Identity;
use parley_types::api::{
    AttachmentSummary, EditMessageRequest, MessageResponse, OkResponse, SendMessageRequest,
    SendMessageResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `createdAt` of the oldest message already seen. Only older
    /// messages are returned.
    pub before: Option<DateTime<Utc>>,
}

fn default_limit() -> u32 {
    50
}

/// POST /messages. The sender must belong to the target chat.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.ciphertext.is_empty() {
        return Err(ApiError::bad_request("ciphertext is required"));
    }

    let message_id = Uuid::new_v4();
    let st = state.clone();
    let sender = identity.user_id;
    blocking(move || {
        st.guard.require_member(req.chat_id, sender)?;
        let reply_to = req.reply_to_id.map(|id| id.to_string());
        st.db.insert_message(
            &message_id.to_string(),
            &req.chat_id.to_string(),
            &sender.to_string(),
            &req.ciphertext,
            &req.nonce,
            reply_to.as_deref(),
        )?;
        Ok(())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message_id })))
}

/// PATCH /messages/{message_id}. Sender only.
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.ciphertext.is_empty() {
        return Err(ApiError::bad_request("ciphertext is required"));
    }

    let st = state.clone();
    let updated = blocking(move || {
        st.guard.require_owner(message_id, identity.user_id)?;
        Ok(st
            .db
            .update_message(&message_id.to_string(), &req.ciphertext, &req.nonce, Utc::now())?)
    })
    .await?;

    if !updated {
        return Err(ApiError::NotFound);
    }
    Ok(Json(OkResponse::ok()))
}

/// DELETE /messages/{message_id}. Sender only; attachment files go too.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let paths = blocking(move || {
        st.guard.require_owner(message_id, identity.user_id)?;
        Ok(st.db.delete_message(&message_id.to_string())?)
    })
    .await?;

    crate::attachments::remove_files(&paths).await;
    info!(message_id = %message_id, files = paths.len(), "message deleted");
    Ok(Json(OkResponse::ok()))
}

/// GET /chats/{chat_id}/messages. Newest first, members only.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let limit = query.limit.clamp(1, MAX_PAGE);

    let (rows, attachment_rows) = blocking(move || {
        st.guard.require_member(chat_id, identity.user_id)?;
        let rows = st.db.get_messages(&chat_id.to_string(), limit, query.before)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let attachments = st.db.get_attachments_for_messages(&ids)?;
        Ok((rows, attachments))
    })
    .await?;

    let mut by_message: HashMap<String, Vec<AttachmentSummary>> = HashMap::new();
    for a in attachment_rows {
        by_message
            .entry(a.message_id.clone())
            .or_default()
            .push(AttachmentSummary {
                id: parse_id(&a.id, "attachment"),
                content_type: a.content_type,
                size_bytes: u64::try_from(a.size_bytes).unwrap_or(0),
            });
    }

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| MessageResponse {
            attachments: by_message.remove(&row.id).unwrap_or_default(),
            id: parse_id(&row.id, "message"),
            chat_id: parse_id(&row.chat_id, "chat"),
            sender_id: parse_id(&row.sender_id, "sender"),
            reply_to_id: row.reply_to.as_deref().map(|r| parse_id(r, "reply")),
            ciphertext: row.ciphertext,
            nonce: row.nonce,
            created_at: row.created_at,
            edited_at: row.edited_at,
        })
        .collect();

    Ok(Json(messages))
}

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} id '{}': {}", what, raw, e);
        Uuid::nil()
    })
}
