//! Telegram adapter (teloxide).
//!
//! Implements the `pbot-core` `MessageChannel` port over the Telegram Bot API
//! and wires the update dispatcher to the `MessageRouter`.

use async_trait::async_trait;

use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use pbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessageChannel,
        types::{FileRef, InlineKeyboard},
    },
    Result,
};

const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Delivery(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(retry_after = ?d, "telegram flood control; retrying");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// Split on char boundaries so every chunk fits one Telegram message.
/// Blank text yields no chunks; Telegram rejects empty messages.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut len = 0usize;
    for line in text.split_inclusive('\n') {
        for ch in line.chars() {
            if len == limit {
                chunks.push(std::mem::take(&mut current));
                len = 0;
            }
            current.push(ch);
            len += 1;
        }
        // Prefer breaking between lines once a chunk is mostly full.
        if len >= limit / 2 && line.ends_with('\n') {
            chunks.push(std::mem::take(&mut current));
            len = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl MessageChannel for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let chunks = split_message(text, MAX_MESSAGE_LEN);
        if chunks.is_empty() {
            return Err(Error::Delivery("refusing to send an empty message".to_string()));
        }

        let mut last = None;
        for chunk in chunks {
            let msg = self
                .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), chunk.clone()))
                .await?;
            last = Some(msg.id.0);
        }

        let message_id = last.ok_or_else(|| Error::Delivery("no message was sent".to_string()))?;
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(message_id),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await?;
        Ok(())
    }

    async fn download_image(&self, file: &FileRef) -> Result<Vec<u8>> {
        let meta = self.with_retry(|| self.bot.get_file(file.0.clone())).await?;

        let mut buf = Vec::new();
        self.bot
            .download_file(&meta.path, &mut buf)
            .await
            .map_err(|e| Error::Delivery(format!("telegram download error: {e}")))?;
        Ok(buf)
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .non_empty_rows()
            .map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
                    .collect()
            })
            .collect();
        let markup = InlineKeyboardMarkup::new(rows);

        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .reply_markup(markup.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(split_message("", 10).is_empty());
        assert!(split_message(" \n\t", 10).is_empty());
    }

    #[tokio::test]
    async fn empty_send_fails_without_calling_telegram() {
        // A request that reached Telegram would fail with a different error.
        let messenger = TelegramMessenger::new(Bot::new("0:token"));
        let err = messenger.send_text(ChatId(1), "").await.unwrap_err();
        assert!(matches!(&err, Error::Delivery(m) if m.contains("empty message")));
    }

    #[test]
    fn long_text_splits_under_limit_without_losing_chars() {
        let text = format!("{}\n{}", "a".repeat(30), "é".repeat(25));
        let chunks = split_message(&text, 20);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.concat(), text);
    }
}
