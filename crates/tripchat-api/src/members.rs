use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use tripchat_types::api::{AccessClaims, AddMemberRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_members(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.list_members(&ctx, &group_id).await?))
}

/// 201 when the user joined, 200 when they already were a member.
pub async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let added = state.chat.add_member(&ctx, &group_id, &req.user_id).await?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "added": added }))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(String, String)>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let removed = state.chat.remove_member(&ctx, &group_id, &user_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
