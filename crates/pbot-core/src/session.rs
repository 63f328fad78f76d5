use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    backend::{ChatSession, ConversationBackend},
    domain::UserId,
    errors::Error,
    persona::Persona,
    Result,
};

/// A user's active conversation: the persona they picked and its backend session.
#[derive(Clone)]
pub struct UserSession {
    pub user_id: UserId,
    /// `None` when the label was outside the catalog (generic prompt).
    pub persona: Option<Persona>,
    pub chat: Arc<dyn ChatSession>,
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("user_id", &self.user_id)
            .field("persona", &self.persona)
            .finish_non_exhaustive()
    }
}

/// In-memory map from user to active session. At most one entry per user.
pub struct SessionRegistry {
    backend: Arc<dyn ConversationBackend>,
    sessions: Mutex<HashMap<UserId, UserSession>>,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn ConversationBackend>) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user_id: UserId) -> Option<UserSession> {
        self.sessions.lock().await.get(&user_id).cloned()
    }

    /// Open a backend session bound to `system_prompt` and make it the user's
    /// active one, replacing any previous entry.
    pub async fn create(
        &self,
        user_id: UserId,
        persona: Option<Persona>,
        system_prompt: &str,
    ) -> Result<UserSession> {
        let chat = self
            .backend
            .create_session(system_prompt)
            .await
            .map_err(|e| match e {
                Error::BackendUnavailable(msg) => Error::BackendUnavailable(msg),
                other => Error::BackendUnavailable(other.to_string()),
            })?;

        let session = UserSession {
            user_id,
            persona,
            chat,
        };
        let replaced = self
            .sessions
            .lock()
            .await
            .insert(user_id, session.clone());
        if let Some(old) = replaced {
            tracing::debug!(%user_id, old = ?old.persona, new = ?persona, "replaced session");
        }
        Ok(session)
    }

    /// Idempotent.
    pub async fn clear(&self, user_id: UserId) -> bool {
        self.sessions.lock().await.remove(&user_id).is_some()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
