//! HTTP edge over the chat service.

pub mod error;
pub mod groups;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod state;

use axum::{
    Json, Router,
    routing::{get, post, put},
};
use serde_json::{Value, json};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All chat routes. Everything except `/health` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/trips/{trip_id}/groups",
            post(groups::create_group).get(groups::list_trip_groups),
        )
        .route(
            "/groups/{group_id}",
            get(groups::get_group)
                .patch(groups::update_group)
                .delete(groups::delete_group),
        )
        .route(
            "/groups/{group_id}/members",
            get(members::list_members).post(members::add_member),
        )
        .route(
            "/groups/{group_id}/members/{user_id}",
            axum::routing::delete(members::remove_member),
        )
        .route(
            "/groups/{group_id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route(
            "/groups/{group_id}/read",
            put(messages::update_last_read).get(messages::get_read_state),
        )
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::update_message)
                .delete(messages::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            get(reactions::list_reactions).post(reactions::add_reaction),
        )
        .route(
            "/messages/{message_id}/reactions/{reaction}",
            axum::routing::delete(reactions::remove_reaction),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(protected)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
