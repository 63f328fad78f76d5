use std::sync::Arc;

use teloxide::prelude::*;

use pbot_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    router::Sender,
};

use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    // Always answer so the client stops its spinner.
    if let Err(e) = state.channel.answer_callback_query(&q.id, None).await {
        tracing::warn!(error = %e, "failed to answer callback query");
    }

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let Some(label) = q.data.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(());
    };

    let from = Sender {
        user_id: UserId(q.from.id.0 as i64),
        chat_id: ChatId(message.chat.id.0),
    };
    let keyboard_message = MessageRef {
        chat_id: from.chat_id,
        message_id: MessageId(message.id.0),
    };

    let _guard = state.chat_locks.lock_chat(from.chat_id.0).await;
    state
        .router
        .select_persona(from, label, Some(keyboard_message))
        .await;
    Ok(())
}
