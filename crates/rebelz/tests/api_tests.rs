//! API integration tests.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{bearer, test_app, test_app_with_state};

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;
    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_dev_login() {
    let app = test_app().await;

    let response = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"username": "dev", "password": "devpassword123"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["token"].is_string());
    assert_eq!(json["user"]["id"], "dev");
    assert_eq!(json["user"]["role"], "admin");

    let response = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"username": "dev", "password": "wrong"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_auth() {
    let app = test_app().await;

    let response = send(&app, Method::GET, "/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, Method::GET, "/me", Some("coach"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], "coach");
    assert_eq!(json["role"], "instructor");
}

async fn create_group(app: &Router, user: &str, name: &str) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/chat/groups",
        Some(user),
        Some(json!({"name": name})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_create_and_list_groups() {
    let app = test_app().await;
    let group_id = create_group(&app, "alice", "Sparring").await;

    let response = send(&app, Method::GET, "/chat/groups", Some("alice"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], group_id);
    assert_eq!(json[0]["member_count"], 1);
    assert_eq!(json[0]["group_type"], "user_created");

    // bob is not a member, sees nothing
    let response = send(&app, Method::GET, "/chat/groups", Some("bob"), None).await;
    let json = body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_managed_group_role_gates() {
    let app = test_app().await;

    // regular users cannot reach the staff surface
    let response = send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("alice"),
        Some(json!({"name": "x", "group_type": "instructor_managed"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // instructors can create instructor-managed groups
    let response = send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("coach"),
        Some(json!({
            "name": "Cohort",
            "group_type": "instructor_managed",
            "member_ids": ["alice", "bob"]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let group = body_json(response).await;
    assert_eq!(group["group_type"], "instructor_managed");
    assert_eq!(group["created_by"], "coach");

    // but not admin-managed ones
    let response = send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("coach"),
        Some(json!({"name": "x", "group_type": "admin_managed"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("dev"),
        Some(json!({"name": "Announcements", "group_type": "admin_managed", "is_public": true})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // initial members were added
    let response = send(&app, Method::GET, "/chat/groups", Some("bob"), None).await;
    let json = body_json(response).await;
    assert_eq!(json[0]["name"], "Cohort");
    assert_eq!(json[0]["member_count"], 3);
}

#[tokio::test]
async fn test_membership_management() {
    let app = test_app().await;
    let group_id = create_group(&app, "alice", "Sparring").await;

    // only group admins may add members
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/members"),
        Some("bob"),
        Some(json!({"user_id": "bob"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/members"),
        Some("alice"),
        Some(json!({"user_id": "bob"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // duplicate add conflicts
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/members"),
        Some("alice"),
        Some(json!({"user_id": "bob"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // members can remove themselves
    let response = send(
        &app,
        Method::DELETE,
        &format!("/chat/groups/{group_id}/members/bob"),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_managed_group_manager_cannot_be_removed() {
    let app = test_app().await;
    let response = send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("coach"),
        Some(json!({"name": "Cohort", "group_type": "instructor_managed"})),
    )
    .await;
    let group_id = body_json(response).await["id"].as_i64().unwrap();

    let response = send(
        &app,
        Method::DELETE,
        &format!("/chat/groups/{group_id}/members/coach"),
        Some("coach"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_group_is_creator_gated() {
    let app = test_app().await;
    let group_id = create_group(&app, "alice", "Sparring").await;
    send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/messages"),
        Some("alice"),
        Some(json!({"content": "hi"})),
    )
    .await;

    // only the creator may delete
    let response = send(
        &app,
        Method::DELETE,
        &format!("/chat/groups/{group_id}"),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        Method::DELETE,
        &format!("/chat/groups/{group_id}"),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // group and its history are gone
    let response = send(
        &app,
        Method::GET,
        &format!("/chat/groups/{group_id}/messages"),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&app, Method::GET, "/chat/groups", Some("alice"), None).await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_managed_groups_cannot_be_deleted() {
    let app = test_app().await;
    let response = send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("coach"),
        Some(json!({"name": "Cohort", "group_type": "instructor_managed"})),
    )
    .await;
    let group_id = body_json(response).await["id"].as_i64().unwrap();

    let response = send(
        &app,
        Method::DELETE,
        &format!("/chat/groups/{group_id}"),
        Some("coach"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_join_public_group() {
    let app = test_app().await;
    let response = send(
        &app,
        Method::POST,
        "/chat/groups",
        Some("alice"),
        Some(json!({"name": "Open mat", "is_public": true})),
    )
    .await;
    let open_id = body_json(response).await["id"].as_i64().unwrap();
    let closed_id = create_group(&app, "alice", "Closed").await;

    // regular users cannot join directly
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{open_id}/join"),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{open_id}/join"),
        Some("coach"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&app, Method::GET, "/chat/groups", Some("coach"), None).await;
    assert_eq!(body_json(response).await[0]["name"], "Open mat");

    // joining twice conflicts, private groups stay closed
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{open_id}/join"),
        Some("coach"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{closed_id}/join"),
        Some("coach"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_message_submit_and_history() {
    let app = test_app().await;
    let group_id = create_group(&app, "alice", "Sparring").await;

    // non-member rejected
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/messages"),
        Some("bob"),
        Some(json!({"content": "hi"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // empty content rejected
    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/messages"),
        Some("alice"),
        Some(json!({"content": "   "})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for text in ["first", "second", "third"] {
        let response = send(
            &app,
            Method::POST,
            &format!("/chat/groups/{group_id}/messages"),
            Some("alice"),
            Some(json!({"content": text})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // history is oldest first
    let response = send(
        &app,
        Method::GET,
        &format!("/chat/groups/{group_id}/messages"),
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let contents: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);

    // history is membership gated
    let response = send(
        &app,
        Method::GET,
        &format!("/chat/groups/{group_id}/messages"),
        Some("bob"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_rest_submit_broadcasts_to_live_connections() {
    let (app, state) = test_app_with_state().await;
    let group_id = create_group(&app, "alice", "Sparring").await;

    let (_conn, mut rx) = state.hub.register_group_connection(group_id, "alice");

    let response = send(
        &app,
        Method::POST,
        &format!("/chat/groups/{group_id}/messages"),
        Some("alice"),
        Some(json!({"content": "hello"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let envelope = rx.try_recv().unwrap();
    let raw: Value = serde_json::from_str(&envelope.encode()).unwrap();
    assert_eq!(raw["type"], "message");
    assert_eq!(raw["data"]["content"], "hello");
    assert_eq!(raw["data"]["sender_id"], "alice");
}

#[tokio::test]
async fn test_group_search_is_staff_only() {
    let app = test_app().await;
    send(
        &app,
        Method::POST,
        "/chat/admin/groups",
        Some("dev"),
        Some(json!({"name": "Open training", "group_type": "admin_managed", "is_public": true})),
    )
    .await;
    create_group(&app, "alice", "Open secrets").await;

    let response = send(&app, Method::GET, "/chat/groups/search?q=Open", Some("alice"), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, Method::GET, "/chat/groups/search?q=Open", Some("coach"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["name"], "Open training");
}

#[tokio::test]
async fn test_group_ws_requires_auth() {
    let app = test_app().await;
    let response = send(&app, Method::GET, "/chat/groups/1/ws", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---- agent surface ----

#[tokio::test]
async fn test_agui_stream_headers() {
    let app = test_app().await;
    let response = send(&app, Method::GET, "/agui", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");
}

#[tokio::test]
async fn test_agui_readiness_document() {
    let app = test_app().await;

    let response = send(&app, Method::POST, "/agui", None, Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["authenticated"], false);

    let response = send(&app, Method::POST, "/agui", Some("alice"), Some(json!({}))).await;
    let json = body_json(response).await;
    assert_eq!(json["authenticated"], true);
    assert_eq!(json["user"], "alice name");
}

#[tokio::test]
async fn test_agui_chat_round_trip() {
    let app = test_app().await;
    let response = send(
        &app,
        Method::POST,
        "/agui",
        Some("alice"),
        Some(json!({"messages": [
            {"role": "assistant", "content": "earlier reply"},
            {"role": "user", "content": "hello there"}
        ]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["type"], "message");
    assert_eq!(json["data"]["role"], "assistant");
    assert_eq!(json["data"]["content"], "[stubbed-ai] You said: hello there");
}

#[tokio::test]
async fn test_agui_chat_reply_reaches_open_stream() {
    let (app, state) = test_app_with_state().await;

    let (_id, mut rx) = state.hub.register_user_stream("alice");
    send(
        &app,
        Method::POST,
        "/agui",
        Some("alice"),
        Some(json!({"messages": [{"role": "user", "content": "ping"}]})),
    )
    .await;

    let envelope = rx.try_recv().unwrap();
    let raw: Value = serde_json::from_str(&envelope.encode()).unwrap();
    assert_eq!(raw["data"]["content"], "[stubbed-ai] You said: ping");
}

#[tokio::test]
async fn test_agui_action_dispatch() {
    let app = test_app().await;

    // unknown action
    let response = send(
        &app,
        Method::POST,
        "/agui",
        None,
        Some(json!({"action": "nope"})),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["type"], "error");
    assert_eq!(json["data"]["code"], "UNKNOWN_ACTION");

    // createEvent needs credentials
    let response = send(
        &app,
        Method::POST,
        "/agui",
        None,
        Some(json!({"action": "createEvent", "args": {"title": "x"}})),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["code"], "AUTH_REQUIRED");

    // and a complete argument set
    let response = send(
        &app,
        Method::POST,
        "/agui",
        Some("alice"),
        Some(json!({"action": "createEvent", "args": {"title": "x"}})),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["code"], "INVALID_ARGUMENTS");

    let response = send(
        &app,
        Method::POST,
        "/agui",
        Some("alice"),
        Some(json!({"action": "createEvent", "args": {
            "title": "Open mat",
            "startDateTime": "2025-06-01T18:00:00Z",
            "endDateTime": "2025-06-01T20:00:00Z"
        }})),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["type"], "events");
    assert_eq!(json["data"]["events"][0]["title"], "Open mat");

    let response = send(
        &app,
        Method::POST,
        "/agui",
        None,
        Some(json!({"action": "searchEvents"})),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["type"], "events");
    assert_eq!(json["data"]["message"], "Found 1 events matching your criteria");
}

#[tokio::test]
async fn test_agui_message_strict_envelope() {
    let app = test_app().await;

    let response = send(
        &app,
        Method::POST,
        "/agui/message",
        None,
        Some(json!({"type": "message", "data": {"role": "user", "content": "hi"}})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["content"], "[stubbed-ai] You said: hi");

    // non-message envelopes are rejected at the envelope level
    let response = send(
        &app,
        Method::POST,
        "/agui/message",
        None,
        Some(json!({"type": "typing", "data": {}})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["type"], "error");
    assert_eq!(json["data"]["code"], "MALFORMED_ENVELOPE");
}

#[tokio::test]
async fn test_action_listing() {
    let app = test_app().await;
    let response = send(&app, Method::GET, "/agui/actions", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let actions = json["actions"].as_array().unwrap();
    let names: Vec<&str> = actions.iter().map(|a| a["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["createEvent", "searchEvents", "registerForEvent"]);

    let create = &actions[0];
    let required: Vec<&str> = create["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["required"] == true)
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(required, vec!["title", "startDateTime", "endDateTime"]);
}
