use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use pbot_core::{
    backend::ConversationBackend,
    config::Config,
    history::{HistoryStore, SqliteHistoryStore},
    messaging::{
        port::MessageChannel,
        throttled::{ThrottleConfig, ThrottledChannel},
    },
    router::MessageRouter,
};
use pbot_gemini::GeminiBackend;

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<MessageRouter>,
    pub channel: Arc<dyn MessageChannel>,
    pub chat_locks: Arc<ChatLocks>,
}

/// Serializes update handling per chat so replies keep their order.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Entries only the map references are idle; clones are handed out
            // under this lock, so dropping them cannot split a chat in two.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "pbot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }

    let history = Arc::new(SqliteHistoryStore::connect(&cfg.history_db_path).await?);
    tracing::info!(path = %cfg.history_db_path.display(), "chat log ready");

    let backend: Arc<dyn ConversationBackend> = Arc::new(GeminiBackend::from_config(&cfg)?);
    tracing::info!(model = %cfg.gemini_model, "gemini backend configured");

    // Throttle outbound traffic; 429 RetryAfter is still retried in the adapter.
    let raw_channel: Arc<dyn MessageChannel> = Arc::new(TelegramMessenger::new(bot.clone()));
    let channel: Arc<dyn MessageChannel> = Arc::new(ThrottledChannel::new(
        raw_channel,
        ThrottleConfig::from(cfg.as_ref()),
    ));

    let history_port: Arc<dyn HistoryStore> = history.clone();
    let router = Arc::new(MessageRouter::new(
        backend,
        history_port,
        channel.clone(),
        cfg.followup,
    ));

    let state = Arc::new(AppState {
        router: router.clone(),
        channel,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped; cancelling follow-ups");
    router.shutdown().await;
    history.close().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn chat_lock_serializes_same_chat_only() {
        let locks = Arc::new(ChatLocks::default());
        let guard = locks.lock_chat(1).await;

        // Another chat is not blocked.
        let _other = tokio::time::timeout(Duration::from_millis(100), locks.lock_chat(2))
            .await
            .expect("different chat should lock immediately");

        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.lock_chat(1).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn idle_chat_locks_are_pruned() {
        let locks = ChatLocks::default();
        for chat in 0..50 {
            let _g = locks.lock_chat(chat).await;
        }
        // Each call prunes every idle entry before adding its own.
        assert_eq!(locks.tracked().await, 1);

        let held = locks.lock_chat(100).await;
        let _other = locks.lock_chat(101).await;
        assert_eq!(locks.tracked().await, 2);

        drop(held);
        let _again = locks.lock_chat(102).await;
        // 101 is still held; 100 was released.
        assert_eq!(locks.tracked().await, 2);
    }
}
