//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::auth_middleware;
use crate::ws::handler as ws_handler;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth_state = state.auth.clone();

    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route("/me", get(handlers::get_me))
        // Group chat
        .route(
            "/chat/groups",
            post(handlers::create_group).get(handlers::list_groups),
        )
        .route("/chat/groups/{group_id}", delete(handlers::delete_group))
        .route("/chat/admin/groups", post(handlers::create_managed_group))
        .route("/chat/groups/search", get(handlers::search_groups))
        .route("/chat/groups/{group_id}/join", post(handlers::join_group))
        .route("/chat/groups/{group_id}/members", post(handlers::add_member))
        .route(
            "/chat/groups/{group_id}/members/{member_id}",
            delete(handlers::remove_member),
        )
        .route(
            "/chat/groups/{group_id}/messages",
            post(handlers::post_message).get(handlers::get_messages),
        )
        .route("/chat/groups/{group_id}/ws", get(ws_handler::group_ws))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Public routes (no authentication)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::login))
        .with_state(state.clone());

    // Agent surface: optional identity, anonymous allowed
    let agent_routes = Router::new()
        .route("/agui", get(handlers::agui_stream).post(handlers::agui_runtime))
        .route("/agui/message", post(handlers::agui_message))
        .route("/agui/actions", get(handlers::list_actions))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(agent_routes)
        .layer(cors)
        .layer(trace_layer)
}

/// Build the CORS layer based on configuration.
///
/// In dev mode with no configured origins, allows common localhost origins.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let allowed_origins = state.auth.allowed_origins();
    let dev_mode = state.auth.is_dev_mode();

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ORIGIN,
        header::COOKIE,
        header::HeaderName::from_static("x-dev-user"),
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        if dev_mode {
            tracing::warn!(
                "CORS: no origins configured, using default localhost origins for dev mode"
            );
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost:3000"),
                    HeaderValue::from_static("http://localhost:8080"),
                    HeaderValue::from_static("http://127.0.0.1:3000"),
                    HeaderValue::from_static("http://127.0.0.1:8080"),
                ])
                .allow_methods(methods)
                .allow_headers(headers)
                .allow_credentials(true)
        } else {
            tracing::warn!("CORS: no origins configured, cross-origin requests disabled");
            CorsLayer::new()
        }
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
    }
}
