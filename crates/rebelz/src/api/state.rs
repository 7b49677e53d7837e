//! Application state shared across handlers.

use anyhow::Result;
use axum::extract::FromRef;
use std::sync::Arc;

use crate::actions::{ActionRegistry, builtin::register_builtin_actions};
use crate::agent::{Agent, StubAgent};
use crate::auth::AuthState;
use crate::chat::{ChatRepository, ChatService};
use crate::db::Database;
use crate::events::EventRepository;
use crate::settings::{Settings, StreamSettings};
use crate::ws::ChatHub;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub auth: AuthState,
    pub hub: Arc<ChatHub>,
    pub chat: Arc<ChatService>,
    pub actions: Arc<ActionRegistry>,
    pub agent: Arc<dyn Agent>,
    pub stream: StreamSettings,
}

impl AppState {
    /// Wire up the full application graph from settings and an open
    /// database. The stub agent is the only shipped agent backend.
    pub fn new(settings: &Settings, db: Database) -> Result<Self> {
        let auth = AuthState::new(settings.auth.clone());
        let hub = ChatHub::new(settings.stream.queue_size);
        let chat = ChatService::new(ChatRepository::new(db.clone()), hub.clone());

        let events = Arc::new(EventRepository::new(db.clone()));
        let mut actions = ActionRegistry::new();
        register_builtin_actions(&mut actions, events)?;

        Ok(Self {
            db,
            auth,
            hub,
            chat,
            actions: Arc::new(actions),
            agent: Arc::new(StubAgent),
            stream: settings.stream.clone(),
        })
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
