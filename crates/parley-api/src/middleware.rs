use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::Utc;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::ApiError;

/// Verify the bearer token, expose the caller as an
/// [`parley_auth::Identity`] request extension, and record activity once
/// the handler has run.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;

    let identity = state.auth.verify_token(bearer.token()).map_err(|e| {
        debug!("token rejected: {}", e);
        ApiError::from(e)
    })?;
    let user_id = identity.user_id;

    req.extensions_mut().insert(identity);
    let response = next.run(req).await;

    // Activity tracking never fails the request.
    let db = state.db.clone();
    let touched = tokio::task::spawn_blocking(move || {
        db.touch_last_active(&user_id.to_string(), Utc::now())
    })
    .await;
    match touched {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(user_id = %user_id, "failed to record activity: {}", e),
        Err(e) => warn!(user_id = %user_id, "activity task failed: {}", e),
    }

    Ok(response)
}
