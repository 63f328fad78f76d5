use std::sync::Arc;

use teloxide::prelude::*;

use pbot_core::{
    messaging::types::FileRef,
    router::{ImageUpload, Sender},
};

use crate::router::AppState;

pub async fn handle_photo(msg: Message, state: Arc<AppState>, from: Sender) -> ResponseResult<()> {
    // Telegram lists sizes smallest first.
    let Some(best) = msg.photo().and_then(|photos| photos.last()) else {
        return Ok(());
    };

    let upload = ImageUpload {
        file: FileRef(best.file.id.clone()),
        caption: msg.caption().map(str::to_string),
    };

    tracing::info!(
        user_id = %from.user_id,
        width = best.width,
        height = best.height,
        "photo message"
    );
    state.router.handle_image(from, upload).await;
    Ok(())
}
