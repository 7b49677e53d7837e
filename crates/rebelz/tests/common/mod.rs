//! Test utilities and common setup.

use axum::Router;
use rebelz::api::{AppState, create_router};
use rebelz::auth::{AuthConfig, DevUser, Role};
use rebelz::db::Database;
use rebelz::settings::Settings;

fn dev_user(id: &str, role: Role) -> DevUser {
    // minimum bcrypt cost keeps test setup fast
    let password_hash = bcrypt::hash(format!("{id}password123"), 4).unwrap();
    DevUser {
        id: id.to_string(),
        name: format!("{id} name"),
        email: format!("{id}@localhost"),
        password_hash,
        role,
    }
}

/// Dev-mode settings with one user per role plus a spare regular user.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.auth = AuthConfig {
        dev_mode: true,
        jwt_secret: Some("test-secret-for-integration-tests-minimum-32-chars".to_string()),
        dev_users: vec![
            dev_user("dev", Role::Admin),
            dev_user("coach", Role::Instructor),
            dev_user("alice", Role::User),
            dev_user("bob", Role::User),
        ],
        ..AuthConfig::default()
    };
    settings
}

/// Create a test application with all services on an in-memory database.
pub async fn test_app() -> Router {
    test_app_with_state().await.0
}

/// Like `test_app`, but also hands back the state for direct hub access.
pub async fn test_app_with_state() -> (Router, AppState) {
    let settings = test_settings();
    let db = Database::in_memory().await.unwrap();
    let state = AppState::new(&settings, db).unwrap();
    (create_router(state.clone()), state)
}

/// Dev-mode bearer token for a configured dev user.
pub fn bearer(user_id: &str) -> String {
    format!("Bearer dev:{user_id}")
}
