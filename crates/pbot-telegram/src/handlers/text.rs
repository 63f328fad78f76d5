use std::sync::Arc;

use teloxide::prelude::*;

use pbot_core::router::Sender;

use crate::router::AppState;

pub async fn handle_text(msg: Message, state: Arc<AppState>, from: Sender) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    tracing::info!(user_id = %from.user_id, len = text.len(), "text message");
    state.router.handle_text(from, text).await;
    Ok(())
}
