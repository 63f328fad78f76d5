//! Telegram update handlers.
//!
//! Each handler converts a teloxide update into a `MessageRouter` call. The
//! router never fails, so handlers only fail on Telegram transport errors.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use pbot_core::{
    domain::{ChatId, UserId},
    router::Sender,
};

use crate::router::AppState;

mod callback;
mod commands;
mod photo;
mod text;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(from) = sender_of(&msg) else {
        return Ok(());
    };

    // Sequentialize updates per chat.
    let _guard = state.chat_locks.lock_chat(from.chat_id.0).await;

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(msg, state, from).await;
        }
        return text::handle_text(msg, state, from).await;
    }

    if msg.photo().is_some() {
        return photo::handle_photo(msg, state, from).await;
    }

    tracing::debug!(user_id = %from.user_id, "ignoring unsupported message type");
    Ok(())
}

fn sender_of(msg: &Message) -> Option<Sender> {
    let user = msg.from()?;
    Some(Sender {
        user_id: UserId(user.id.0 as i64),
        chat_id: ChatId(msg.chat.id.0),
    })
}
