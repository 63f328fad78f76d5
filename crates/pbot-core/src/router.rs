//! Message orchestration.
//!
//! One `MessageRouter` per process owns the session registry and the follow-up
//! scheduler. Every user flow degrades to a text reply; nothing here returns
//! an error to the transport layer.

use std::sync::Arc;

use crate::{
    backend::{ConversationBackend, MessageContent},
    config::FollowupConfig,
    domain::{ChatId, EntryId, MessageRef, UserId},
    followup::FollowupScheduler,
    history::HistoryStore,
    imaging::decode_image,
    messaging::{port::MessageChannel, types::FileRef},
    persona::{persona_keyboard, Persona},
    session::{SessionRegistry, UserSession},
};

pub const WELCOME_TEXT: &str = "Welcome! Please choose a historical personality to chat with:";
pub const NO_SESSION_TEXT: &str = "Please choose a personality first by using /start.";
pub const PERSONA_FAILED_TEXT: &str =
    "Sorry, I'm unable to set up the conversation with that personality right now.";
pub const CLEARED_TEXT: &str = "Your conversation history has been cleared.";
pub const TEXT_FALLBACK: &str = "I'm having trouble processing your request right now.";
pub const IMAGE_FALLBACK: &str = "I'm having trouble processing your image right now.";
pub const IMAGE_FAILED_TEXT: &str = "Sorry, I couldn't process your image.";
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image.";

/// Identifies who sent an update and where to answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub chat_id: ChatId,
}

/// Inbound image: transport file reference plus optional caption.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub file: FileRef,
    pub caption: Option<String>,
}

impl ImageUpload {
    fn caption(&self) -> Option<&str> {
        self.caption.as_deref().filter(|c| !c.is_empty())
    }

    /// What gets written to the chat log on receipt.
    pub fn log_marker(&self) -> String {
        match self.caption() {
            Some(c) => format!("Image message with caption: {c}"),
            None => "Image message".to_string(),
        }
    }

    /// Text sent to the backend alongside the image.
    pub fn prompt(&self) -> String {
        self.caption().unwrap_or(DEFAULT_IMAGE_PROMPT).to_string()
    }
}

pub struct MessageRouter {
    sessions: SessionRegistry,
    followups: FollowupScheduler,
    history: Arc<dyn HistoryStore>,
    channel: Arc<dyn MessageChannel>,
}

impl MessageRouter {
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        history: Arc<dyn HistoryStore>,
        channel: Arc<dyn MessageChannel>,
        followup: FollowupConfig,
    ) -> Self {
        let followups = FollowupScheduler::new(followup, history.clone(), channel.clone());
        Self::with_scheduler(backend, history, channel, followups)
    }

    /// Use a preconfigured scheduler (custom dice in tests).
    pub fn with_scheduler(
        backend: Arc<dyn ConversationBackend>,
        history: Arc<dyn HistoryStore>,
        channel: Arc<dyn MessageChannel>,
        followups: FollowupScheduler,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(backend),
            followups,
            history,
            channel,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn followups(&self) -> &FollowupScheduler {
        &self.followups
    }

    /// `/start`: persona selection keyboard.
    pub async fn show_personas(&self, chat_id: ChatId) {
        if let Err(e) = self
            .channel
            .send_inline_keyboard(chat_id, WELCOME_TEXT, persona_keyboard())
            .await
        {
            tracing::error!(%chat_id, error = %e, "failed to send persona keyboard");
        }
    }

    /// Keyboard callback: open a session for the chosen persona.
    ///
    /// `keyboard_message` is edited in place when present.
    pub async fn select_persona(
        &self,
        from: Sender,
        label: &str,
        keyboard_message: Option<MessageRef>,
    ) {
        let Sender { user_id, chat_id } = from;
        let system_prompt = Persona::prompt_for_label(label);
        // Unknown labels still get a session, on the generic prompt.
        let persona = Persona::from_label(label);
        if persona.is_none() {
            tracing::warn!(%user_id, label, "unknown persona label; using default prompt");
        }

        let text = match self.sessions.create(user_id, persona, &system_prompt).await {
            Ok(_) => {
                // Any running chain belongs to the discarded session.
                self.followups.cancel(user_id).await;
                tracing::info!(%user_id, persona = label, "persona selected");
                format!("You are now chatting with {label}. How can I help you today?")
            }
            Err(e) => {
                tracing::error!(%user_id, persona = label, error = %e, "failed to create session");
                PERSONA_FAILED_TEXT.to_string()
            }
        };

        match keyboard_message {
            Some(msg) => {
                if let Err(e) = self.channel.edit_text(msg, &text).await {
                    tracing::warn!(%chat_id, error = %e, "failed to edit keyboard message");
                }
            }
            None => self.reply(chat_id, &text).await,
        }
    }

    pub async fn handle_text(&self, from: Sender, text: &str) {
        let Some(session) = self.begin_interaction(from).await else {
            return;
        };

        let entry = self.log_input(from.user_id, text).await;
        let output = match session.chat.send(MessageContent::text(text)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(user_id = %from.user_id, error = %e, "backend failed on text message");
                TEXT_FALLBACK.to_string()
            }
        };

        self.finish_interaction(from, session, entry, &output).await;
    }

    pub async fn handle_image(&self, from: Sender, upload: ImageUpload) {
        let Some(session) = self.begin_interaction(from).await else {
            return;
        };

        let entry = self.log_input(from.user_id, &upload.log_marker()).await;

        let image = self
            .channel
            .download_image(&upload.file)
            .await
            .and_then(decode_image);
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(user_id = %from.user_id, error = %e, "error processing the image");
                self.reply(from.chat_id, IMAGE_FAILED_TEXT).await;
                return;
            }
        };

        let content = MessageContent::Image {
            image,
            prompt: upload.prompt(),
        };
        let output = match session.chat.send(content).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(user_id = %from.user_id, error = %e, "backend failed on image message");
                IMAGE_FALLBACK.to_string()
            }
        };

        self.finish_interaction(from, session, entry, &output).await;
    }

    /// `/clear`: wipe the log, drop the session, stop follow-ups. Idempotent.
    pub async fn clear_history(&self, from: Sender) {
        let user_id = from.user_id;
        self.followups.cancel(user_id).await;

        match self.history.delete_all(user_id).await {
            Ok(n) => tracing::info!(%user_id, rows = n, "history cleared"),
            Err(e) => tracing::error!(%user_id, error = %e, "failed to delete history"),
        }
        self.sessions.clear(user_id).await;

        self.reply(from.chat_id, CLEARED_TEXT).await;
    }

    /// Stop every background chain (process shutdown).
    pub async fn shutdown(&self) {
        self.followups.shutdown().await;
    }

    /// Cancel the pending chain first, then resolve the session.
    async fn begin_interaction(&self, from: Sender) -> Option<UserSession> {
        self.followups.cancel(from.user_id).await;

        let session = self.sessions.get(from.user_id).await;
        if session.is_none() {
            self.reply(from.chat_id, NO_SESSION_TEXT).await;
        }
        session
    }

    async fn finish_interaction(
        &self,
        from: Sender,
        session: UserSession,
        entry: Option<EntryId>,
        output: &str,
    ) {
        if let Some(entry) = entry {
            if let Err(e) = self.history.update_output(entry, output).await {
                tracing::error!(user_id = %from.user_id, error = %e, "failed to store reply");
            }
        }

        self.reply(from.chat_id, output).await;

        let probability = self.followups.config().initial_probability;
        self.followups
            .start(from.user_id, session.chat, from.chat_id, probability)
            .await;
    }

    async fn log_input(&self, user_id: UserId, input: &str) -> Option<EntryId> {
        match self.history.append(user_id, input, None).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(%user_id, error = %e, "failed to log message");
                None
            }
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.channel.send_text(chat_id, text).await {
            tracing::error!(%chat_id, error = %e, "failed to deliver reply");
        }
    }
}
