use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use tripchat_types::api::{AccessClaims, LastReadRequest, MessageContentRequest, PageRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn post_message(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<MessageContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let view = state.chat.post_message(&ctx, &group_id, &req.content).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Newest first; `limit` is clamped to 1..=200.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(page): Query<PageRequest>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.list_messages(&ctx, &group_id, page).await?))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.get_message(&ctx, &message_id).await?))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<MessageContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let view = state
        .chat
        .update_message(&ctx, &message_id, &req.content)
        .await?;
    Ok(Json(view))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    state.chat.delete_message(&ctx, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_last_read(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<LastReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let cursor = state
        .chat
        .update_last_read(&ctx, &group_id, &req.message_id)
        .await?;
    Ok(Json(cursor))
}

pub async fn get_read_state(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.get_read_state(&ctx, &group_id).await?))
}
