//! Rebelz backend library.
//!
//! Real-time group messaging and agent event streaming for the Rebelz
//! community platform. CRUD surfaces for users, roles and events live in
//! their own services; this crate owns the chat fan-out pipeline, the
//! per-user agent streams and the action dispatch bridge between them.

pub mod actions;
pub mod agent;
pub mod api;
pub mod auth;
pub mod chat;
pub mod db;
pub mod events;
pub mod protocol;
pub mod settings;
pub mod ws;
