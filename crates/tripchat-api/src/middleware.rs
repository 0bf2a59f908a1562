use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use tripchat_chat::ChatError;

use crate::error::ApiError;
use crate::state::AppState;

/// Validate the bearer token and attach its claims to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError(ChatError::Unauthorized("missing bearer token".into())))?;

    let claims = state.tokens.validate_access(token).map_err(|e| {
        debug!("rejected access token: {}", e);
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
