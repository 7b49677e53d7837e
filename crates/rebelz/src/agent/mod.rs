//! Agent collaborator.
//!
//! The stream controller only sees the `Agent` trait. `StubAgent` is the
//! shipped offline implementation; a real model client plugs in here.

use async_trait::async_trait;

use crate::auth::Identity;

#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce an assistant reply for one user message.
    async fn respond(&self, content: &str, identity: Option<&Identity>) -> anyhow::Result<String>;
}

/// Deterministic echo agent used when no model backend is configured.
pub struct StubAgent;

#[async_trait]
impl Agent for StubAgent {
    async fn respond(&self, content: &str, _identity: Option<&Identity>) -> anyhow::Result<String> {
        Ok(format!("[stubbed-ai] You said: {content}"))
    }
}
