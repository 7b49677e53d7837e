//! Group chat domain: models, persistence and the submit pipeline.

pub mod models;
pub mod repository;
pub mod service;

pub use models::{ChatError, ChatGroup, ChatMessage, GroupKind, GroupSummary};
pub use repository::ChatRepository;
pub use service::ChatService;
