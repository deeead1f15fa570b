//! HTTP surface of the Parley messaging backend.
//!
//! Every route except registration, login and the health check sits behind
//! [`middleware::require_auth`]. Handlers do their datastore and hashing work
//! on the blocking pool and report failures through [`error::ApiError`].

pub mod attachments;
pub mod auth;
pub mod chats;
pub mod error;
pub mod invites;
pub mod messages;
pub mod middleware;
pub mod users;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
};
use tracing::error;

use parley_auth::{AccessGuard, AuthService, InviteLedger};
use parley_db::Database;
use parley_types::api::OkResponse;

use crate::error::{ApiError, ApiResult};

/// Largest accepted upload, for attachments and avatars alike.
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: AuthService,
    pub guard: AccessGuard,
    pub invites: InviteLedger,
    /// Root for `uploads/` and `avatars/`.
    pub data_dir: PathBuf,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, auth: AuthService, data_dir: PathBuf) -> Self {
        Self {
            guard: AccessGuard::new(db.clone()),
            invites: InviteLedger::new(db.clone()),
            db,
            auth,
            data_dir,
        }
    }
}

/// Assemble every route. CORS and request tracing are layered on by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/me/password", put(users::change_password))
        .route("/users/me/avatar", post(users::upload_avatar).get(users::get_avatar))
        .route("/chats", post(chats::create_chat))
        .route("/chats/{chat_id}/clear", delete(chats::clear_chat))
        .route("/chats/{chat_id}/messages", get(messages::get_messages))
        .route("/messages", post(messages::send_message))
        .route("/messages/{message_id}", patch(messages::edit_message).delete(messages::delete_message))
        .route("/messages/{message_id}/attachments", post(attachments::upload_attachment))
        .route("/attachments/{attachment_id}", get(attachments::download_attachment))
        .route("/invites", post(invites::create_invite).get(invites::list_invites))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { Json(OkResponse::ok()) }))
        .nest("/api/v1", api)
}

/// Run datastore or hashing work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow!("blocking task failed: {e}"))
    })?
}
