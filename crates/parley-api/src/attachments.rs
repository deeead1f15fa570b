use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_auth::Identity;
use parley_db::models::AttachmentRow;

use crate::error::{ApiError, ApiResult};
use crate::{AppState, MAX_UPLOAD_SIZE, blocking};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Media a browser renders without running anything. SVG is an image type
/// that can carry script, so it is left out.
fn is_inert_media(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.split_once('/') {
        Some(("image", "svg+xml")) => false,
        Some(("image" | "audio" | "video", sub)) => !sub.is_empty(),
        _ => essence == DEFAULT_CONTENT_TYPE,
    }
}

/// Headers for serving client-supplied bytes from our own origin. Anything
/// outside the inert media types goes out as an opaque download.
pub(crate) fn download_headers(stored_type: &str) -> [(header::HeaderName, String); 3] {
    let content_type = if is_inert_media(stored_type) {
        stored_type.to_string()
    } else {
        DEFAULT_CONTENT_TYPE.to_string()
    };
    [
        (header::CONTENT_TYPE, content_type),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        (header::CONTENT_DISPOSITION, "attachment".to_string()),
    ]
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub attachment_id: Uuid,
    pub size_bytes: u64,
}

/// POST /messages/{message_id}/attachments. The body is the raw (already
/// encrypted) file; its `Content-Type` is stored as given and listed to
/// members, but downloads only echo it for inert media. Sender only.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    if bytes.is_empty() {
        return Err(ApiError::bad_request("file body required"));
    }
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(ApiError::PayloadTooLarge);
    }

    let st = state.clone();
    let chat_id = blocking(move || {
        st.guard.require_owner(message_id, identity.user_id)?;
        st.db
            .get_message_chat(&message_id.to_string())?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    // The chat id comes from our own rows, but it still names a directory.
    let chat_dir: Uuid = chat_id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt chat id '{chat_id}': {e}"))?;
    let dir = state.data_dir.join("uploads").join(chat_dir.to_string());
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create uploads directory {}: {}", dir.display(), e);
        anyhow::Error::from(e)
    })?;

    let attachment_id = Uuid::new_v4();
    let path = dir.join(attachment_id.to_string());
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        anyhow::Error::from(e)
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        anyhow::Error::from(e)
    })?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();
    let size = bytes.len() as u64;
    let row = AttachmentRow {
        id: attachment_id.to_string(),
        message_id: message_id.to_string(),
        file_path: path.to_string_lossy().into_owned(),
        content_type,
        size_bytes: bytes.len() as i64,
    };

    let db = state.db.clone();
    if let Err(e) = blocking(move || Ok(db.insert_attachment(&row)?)).await {
        // No row points at the file, so nothing would ever remove it.
        remove_files(&[path.to_string_lossy().into_owned()]).await;
        return Err(e);
    }

    info!(attachment_id = %attachment_id, message_id = %message_id, size, "attachment stored");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            attachment_id,
            size_bytes: size,
        }),
    ))
}

/// GET /attachments/{attachment_id}. Any member of the chat the message
/// was posted to.
pub async fn download_attachment(
    State(state): State<AppState>,
    Path(attachment_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let row = blocking(move || {
        st.guard.require_attachment(attachment_id, identity.user_id)?;
        let found = st.db.get_attachment(&attachment_id.to_string())?;
        Ok(found.map(|(row, _)| row))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let bytes = tokio::fs::read(&row.file_path).await.map_err(|e| {
        error!("Failed to read file {}: {}", row.file_path, e);
        ApiError::NotFound
    })?;

    Ok((download_headers(&row.content_type), bytes))
}

/// Best-effort unlink of stored files. Missing files are not an error.
pub(crate) async fn remove_files(paths: &[String]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_media_keeps_its_type() {
        for ty in ["image/png", "video/mp4", "audio/ogg; codecs=opus", "application/octet-stream"] {
            assert_eq!(download_headers(ty)[0].1, ty);
        }
    }

    #[test]
    fn active_content_is_served_opaque() {
        for ty in ["text/html", "Text/HTML; charset=utf-8", "image/svg+xml", "application/xhtml+xml", "image/", ""] {
            assert_eq!(download_headers(ty)[0].1, DEFAULT_CONTENT_TYPE, "{ty}");
        }
    }
}
