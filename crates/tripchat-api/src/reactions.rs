use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use tripchat_types::api::{AccessClaims, ReactionRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_reactions(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.list_reactions(&ctx, &message_id).await?))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let added = state
        .chat
        .add_reaction(&ctx, &message_id, &req.reaction)
        .await?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "added": added }))))
}

/// The reaction symbol travels percent-encoded in the path.
pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((message_id, reaction)): Path<(String, String)>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let removed = state
        .chat
        .remove_reaction(&ctx, &message_id, &reaction)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}
