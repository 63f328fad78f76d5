//! Generative backend port.
//!
//! A backend hands out chat sessions bound to one system prompt. Sessions are
//! shared (`Arc`) between the registry and any follow-up chain that is still
//! running for them; the session is released when the last holder drops it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{imaging::DecodedImage, Result};

/// What a user turn sends to the backend.
#[derive(Clone, Debug)]
pub enum MessageContent {
    Text(String),
    Image { image: DecodedImage, prompt: String },
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        MessageContent::Text(s.into())
    }
}

#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Fails with `Error::BackendUnavailable`.
    async fn create_session(&self, system_prompt: &str) -> Result<Arc<dyn ChatSession>>;
}

/// A stateful conversation (the backend keeps the turn history).
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Fails with `Error::Backend`.
    async fn send(&self, content: MessageContent) -> Result<String>;
}
