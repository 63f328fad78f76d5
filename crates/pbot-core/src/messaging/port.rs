use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{FileRef, InlineKeyboard},
    Result,
};

/// Messaging transport port.
///
/// Telegram is the only implementation; the core only ever talks plain text.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn download_image(&self, file: &FileRef) -> Result<Vec<u8>>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
