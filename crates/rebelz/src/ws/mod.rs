//! Real-time transport: connection registry, group chat sockets and per-user
//! agent streams.

pub mod handler;
pub mod hub;
pub mod stream;

pub use hub::{ChatHub, ConnectionId};
