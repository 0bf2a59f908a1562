use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use tripchat_types::api::{AccessClaims, CreateGroupRequest, PageRequest};
use tripchat_types::models::GroupPatch;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_group(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let group = state
        .chat
        .create_group(&ctx, &trip_id, &req.name, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_trip_groups(
    State(state): State<AppState>,
    Path(trip_id): Path<String>,
    Query(page): Query<PageRequest>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    let page = state.chat.list_trip_groups(&ctx, &trip_id, page).await?;
    Ok(Json(page))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.get_group(&ctx, &group_id).await?))
}

pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
    Json(patch): Json<GroupPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    Ok(Json(state.chat.update_group(&ctx, &group_id, &patch).await?))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.context(claims);
    state.chat.delete_group(&ctx, &group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
