//! API request handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{info, instrument, warn};

use crate::auth::{CurrentUser, OptionalIdentity, RequireStaff};
use crate::chat::{ChatGroup, ChatMessage, GroupKind, GroupSummary};
use crate::protocol::{CODE_MALFORMED_ENVELOPE, Envelope, MessageRole};
use crate::ws::stream::{anonymous_key, open_envelope_stream};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

const CODE_AGENT_ERROR: &str = "AGENT_ERROR";

// ---- health and auth ----

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
}

/// Dev-mode credential login. Verifies against the configured dev users and
/// issues a JWT (or a `dev:` token when no signing secret is configured).
#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .auth
        .validate_dev_credentials(&body.username, &body.password)
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    let token = match state.auth.generate_dev_token(user) {
        Ok(token) => token,
        Err(_) if state.auth.is_dev_mode() => format!("dev:{}", user.id),
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, "dev login");
    Ok(Json(LoginResponse {
        token,
        user: UserProfile {
            id: user.id.clone(),
            name: user.name.clone(),
            email: Some(user.email.clone()),
            role: user.role.to_string(),
        },
    }))
}

pub async fn get_me(user: CurrentUser) -> Json<UserProfile> {
    Json(UserProfile {
        id: user.id().to_string(),
        name: user.display_name().to_string(),
        email: user.claims.email.clone(),
        role: user.role().to_string(),
    })
}

// ---- group chat ----

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
}

#[instrument(skip(state, user, body))]
pub async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<ChatGroup>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("group name must not be empty"));
    }
    let group = state
        .chat
        .create_group(body.name.trim(), &body.description, body.is_public, user.id())
        .await?;
    info!(group_id = group.id, user_id = %user.id(), "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Debug, Deserialize)]
pub struct CreateManagedGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub group_type: GroupKind,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

/// Create a managed group. Staff only; admin_managed additionally requires
/// the admin role.
#[instrument(skip(state, staff, body))]
pub async fn create_managed_group(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Json(body): Json<CreateManagedGroupRequest>,
) -> ApiResult<(StatusCode, Json<ChatGroup>)> {
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("group name must not be empty"));
    }
    match body.group_type {
        GroupKind::UserCreated => {
            return Err(ApiError::bad_request(
                "managed group creation requires a managed group type",
            ));
        }
        GroupKind::AdminManaged if !staff.is_admin() => {
            return Err(ApiError::forbidden("admin role required for admin-managed groups"));
        }
        _ => {}
    }

    let group = state
        .chat
        .create_managed_group(
            body.name.trim(),
            &body.description,
            body.group_type,
            body.is_public,
            staff.id(),
            &body.member_ids,
        )
        .await?;
    info!(group_id = group.id, user_id = %staff.id(), "managed group created");
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<GroupSummary>>> {
    Ok(Json(state.chat.list_groups(user.id()).await?))
}

/// Delete a user-created group. The service enforces that only the creator
/// may delete and that managed groups stay.
#[instrument(skip(state, user))]
pub async fn delete_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.chat.delete_group(group_id, user.id()).await?;
    info!(group_id, user_id = %user.id(), "group deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Staff self-service join of a public group.
#[instrument(skip(state, staff))]
pub async fn join_group(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(group_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.chat.join_public_group(group_id, staff.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SearchGroupsQuery {
    #[serde(default)]
    pub q: String,
}

#[instrument(skip(state, _staff))]
pub async fn search_groups(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
    Query(query): Query<SearchGroupsQuery>,
) -> ApiResult<Json<Vec<GroupSummary>>> {
    Ok(Json(state.chat.search_public_groups(&query.q).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[instrument(skip(state, user, body))]
pub async fn add_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<i64>,
    Json(body): Json<AddMemberRequest>,
) -> ApiResult<StatusCode> {
    state.chat.add_member(group_id, user.id(), &body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user))]
pub async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((group_id, member_id)): Path<(i64, String)>,
) -> ApiResult<StatusCode> {
    state.chat.remove_member(group_id, user.id(), &member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[instrument(skip(state, user, body))]
pub async fn post_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<i64>,
    Json(body): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let kind = body.kind.as_deref().unwrap_or("text");
    let message = state.chat.submit(group_id, user.id(), &body.content, kind).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn get_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(group_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(state.chat.history(group_id, user.id(), limit).await?))
}

// ---- agent surface ----

/// Open the per-user agent event stream.
///
/// Anonymous callers get an ephemeral stream key; authenticated callers are
/// keyed by user id, so a reconnect replaces the previous stream.
#[instrument(skip(state, identity))]
pub async fn agui_stream(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
) -> Response {
    let key = identity
        .as_ref()
        .map(|i| i.user_id.clone())
        .unwrap_or_else(anonymous_key);

    let stream = open_envelope_stream(
        state.hub.clone(),
        key,
        identity.as_ref(),
        Duration::from_secs(state.stream.heartbeat_secs),
    );
    let sse_stream =
        stream.map(|envelope| Ok::<_, Infallible>(Event::default().data(envelope.encode())));

    let mut response = Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    // proxies must not buffer the event stream
    response
        .headers_mut()
        .insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}

async fn agent_reply(state: &AppState, content: &str, identity: Option<&crate::auth::Identity>) -> Envelope {
    match state.agent.respond(content, identity).await {
        Ok(text) => Envelope::assistant_message(text),
        Err(e) => {
            warn!(error = %e, "agent collaborator failed");
            Envelope::error("agent failed to produce a reply", Some(CODE_AGENT_ERROR))
        }
    }
}

fn push_to_stream(state: &AppState, identity: Option<&crate::auth::Identity>, envelope: &Envelope) {
    if let Some(identity) = identity {
        state.hub.send_to_user(&identity.user_id, envelope);
    }
}

/// Agent runtime endpoint.
///
/// A body with `messages` routes the latest user message to the agent, a
/// body with `action` dispatches through the registry, and anything else
/// answers with the readiness document. Replies are mirrored onto the
/// caller's stream when one is open.
#[instrument(skip(state, identity, body))]
pub async fn agui_runtime(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
    Json(body): Json<Value>,
) -> Response {
    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        let content = messages.iter().rev().find_map(|m| {
            let role = m.get("role").and_then(Value::as_str)?;
            if role == "user" {
                m.get("content").and_then(Value::as_str)
            } else {
                None
            }
        });

        let reply = match content {
            Some(content) => agent_reply(&state, content, identity.as_ref()).await,
            None => Envelope::error(
                "no user message found in messages",
                Some(CODE_MALFORMED_ENVELOPE),
            ),
        };
        push_to_stream(&state, identity.as_ref(), &reply);
        return Json(reply).into_response();
    }

    if let Some(action) = body.get("action").and_then(Value::as_str) {
        let args = body.get("args").cloned().unwrap_or(Value::Null);
        let envelope = state.actions.dispatch(action, &args, identity.as_ref()).await;
        push_to_stream(&state, identity.as_ref(), &envelope);
        return Json(envelope).into_response();
    }

    let user = identity.as_ref().map(|i| i.display_name.clone());
    Json(json!({
        "status": "ready",
        "authenticated": identity.is_some(),
        "user": user,
    }))
    .into_response()
}

/// Strict envelope request/response path: the body must be a `message`
/// envelope with the user role. All failures are envelope-level, never HTTP.
#[instrument(skip(state, identity, body))]
pub async fn agui_message(
    State(state): State<AppState>,
    OptionalIdentity(identity): OptionalIdentity,
    Json(body): Json<Value>,
) -> Json<Envelope> {
    let envelope = match Envelope::from_value(body) {
        Ok(envelope) => envelope,
        Err(e) => return Json(Envelope::from(e)),
    };

    let reply = match envelope {
        Envelope::Message(data) if data.role == MessageRole::User => {
            agent_reply(&state, &data.content, identity.as_ref()).await
        }
        _ => Envelope::error(
            "expected a message envelope with the user role",
            Some(CODE_MALFORMED_ENVELOPE),
        ),
    };
    push_to_stream(&state, identity.as_ref(), &reply);
    Json(reply)
}

pub async fn list_actions(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "actions": state.actions.describe() }))
}
