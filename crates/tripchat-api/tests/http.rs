use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tripchat_api::{AppStateInner, router};
use tripchat_auth::TokenAuthority;
use tripchat_chat::{ChatService, StaticTripDirectory};
use tripchat_db::{Database, SqliteStore};
use tripchat_gateway::Dispatcher;
use tripchat_types::models::TripRole;

struct TestApp {
    app: Router,
    tokens: Arc<TokenAuthority>,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(SqliteStore::new(db));
        let trips = StaticTripDirectory::new()
            .with_role("t1", "owner", TripRole::Owner)
            .with_role("t1", "member", TripRole::Member);
        let chat = ChatService::new(store, Arc::new(trips), Arc::new(Dispatcher::new()));
        let tokens = Arc::new(TokenAuthority::new("k".repeat(32), "tripchat").unwrap());

        let state = Arc::new(AppStateInner {
            chat: Arc::new(chat),
            tokens: tokens.clone(),
            request_timeout: Duration::from_secs(5),
        });
        Self {
            app: router(state),
            tokens,
        }
    }

    fn token(&self, user_id: &str) -> String {
        self.tokens
            .issue_access(user_id, None, chrono::Duration::minutes(5))
            .unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/groups/g1", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let request = Request::builder()
        .uri("/groups/g1")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn group_and_message_flow() {
    let app = TestApp::new();

    let (status, group) = app
        .call(
            Method::POST,
            "/trips/t1/groups",
            Some("owner"),
            Some(json!({ "name": "General", "description": "everyone" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap().to_string();
    assert_eq!(group["trip_id"], "t1");

    let (status, added) = app
        .call(
            Method::POST,
            &format!("/groups/{group_id}/members"),
            Some("owner"),
            Some(json!({ "user_id": "member" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(added["added"], true);

    let (status, posted) = app
        .call(
            Method::POST,
            &format!("/groups/{group_id}/messages"),
            Some("member"),
            Some(json!({ "content": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let message_id = posted["message"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/messages/{message_id}/reactions"),
            Some("owner"),
            Some(json!({ "reaction": "👍" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, page) = app
        .call(
            Method::GET,
            &format!("/groups/{group_id}/messages?limit=10"),
            Some("owner"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 10);
    assert_eq!(page["items"][0]["message"]["content"], "hello");
    assert_eq!(page["items"][0]["reactions"][0]["count"], 1);

    let (status, state) = app
        .call(Method::GET, &format!("/groups/{group_id}/read"), Some("owner"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["unread_count"], 1);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/groups/{group_id}/read"),
            Some("owner"),
            Some(json!({ "message_id": message_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(Method::DELETE, &format!("/groups/{group_id}"), Some("owner"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .call(Method::GET, &format!("/groups/{group_id}"), Some("owner"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn policy_failures_map_to_status() {
    let app = TestApp::new();

    let (status, body) = app
        .call(
            Method::POST,
            "/trips/t1/groups",
            Some("member"),
            Some(json!({ "name": "Mine" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (_, group) = app
        .call(
            Method::POST,
            "/trips/t1/groups",
            Some("owner"),
            Some(json!({ "name": "General" })),
        )
        .await;
    let group_id = group["id"].as_str().unwrap();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/groups/{group_id}/messages"),
            Some("owner"),
            Some(json!({ "content": "  " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(Method::GET, &format!("/groups/{group_id}"), Some("stranger"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn update_group_applies_patch() {
    let app = TestApp::new();
    let (_, group) = app
        .call(
            Method::POST,
            "/trips/t1/groups",
            Some("owner"),
            Some(json!({ "name": "General" })),
        )
        .await;
    let group_id = group["id"].as_str().unwrap();

    let (status, updated) = app
        .call(
            Method::PATCH,
            &format!("/groups/{group_id}"),
            Some("owner"),
            Some(json!({ "description": "all hands" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "General");
    assert_eq!(updated["description"], "all hands");
}
