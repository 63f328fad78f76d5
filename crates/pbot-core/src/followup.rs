//! Decaying follow-up chains.
//!
//! After a reply, each user may get a background chain that sleeps a random
//! delay, then with probability `p` asks the backend for an unsolicited
//! continuation and delivers it, halving `p` each time. The first failed roll
//! ends the chain. At most one chain exists per user: `start` cancels the
//! previous one and `cancel` is called on every new user input.
//!
//! Cancellation is cooperative. A chain observes its token while sleeping and
//! again as soon as a backend call returns. An in-flight call is never
//! interrupted, but a cancelled chain neither logs nor delivers its result.

use std::{collections::HashMap, sync::Arc, time::Duration};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{ChatSession, MessageContent},
    config::FollowupConfig,
    domain::{ChatId, UserId},
    history::HistoryStore,
    messaging::port::MessageChannel,
};

pub const FOLLOWUP_PROMPT: &str =
    "System: write a continuation, follow up, or a new message, like real human would chat";
pub const FOLLOWUP_FALLBACK: &str = "I'm still processing your request.";
/// Input marker stored in the chat log for proactive messages.
pub const FOLLOWUP_LOG_INPUT: &str = "Follow-up";

/// Source of randomness for chains.
pub trait FollowupDice: Send + Sync {
    /// Uniform delay in `[min, max]`.
    fn delay(&self, min: Duration, max: Duration) -> Duration;
    /// Bernoulli trial: uniform `[0, 1)` draw strictly below `probability`.
    fn roll(&self, probability: f64) -> bool;
}

/// Thread-local RNG backed dice.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomDice;

impl FollowupDice for RandomDice {
    fn delay(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let secs = rand::thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn roll(&self, probability: f64) -> bool {
        rand::thread_rng().gen::<f64>() < probability
    }
}

#[derive(Clone)]
pub struct FollowupScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    cfg: FollowupConfig,
    history: Arc<dyn HistoryStore>,
    channel: Arc<dyn MessageChannel>,
    dice: Arc<dyn FollowupDice>,
    state: Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    chains: HashMap<UserId, ChainEntry>,
    next_generation: u64,
}

struct ChainEntry {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Chain {
    user_id: UserId,
    chat_id: ChatId,
    session: Arc<dyn ChatSession>,
    generation: u64,
    probability: f64,
}

/// How a chain ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChainEnd {
    RollFailed,
    Cancelled,
}

impl FollowupScheduler {
    pub fn new(
        cfg: FollowupConfig,
        history: Arc<dyn HistoryStore>,
        channel: Arc<dyn MessageChannel>,
    ) -> Self {
        Self::with_dice(cfg, history, channel, Arc::new(RandomDice))
    }

    pub fn with_dice(
        cfg: FollowupConfig,
        history: Arc<dyn HistoryStore>,
        channel: Arc<dyn MessageChannel>,
        dice: Arc<dyn FollowupDice>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cfg,
                history,
                channel,
                dice,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn config(&self) -> FollowupConfig {
        self.inner.cfg
    }

    /// Begin a new chain for `user_id`, superseding any running one.
    pub async fn start(
        &self,
        user_id: UserId,
        session: Arc<dyn ChatSession>,
        chat_id: ChatId,
        initial_probability: f64,
    ) {
        let mut st = self.inner.state.lock().await;
        if let Some(old) = st.chains.remove(&user_id) {
            old.cancel.cancel();
            tracing::debug!(%user_id, generation = old.generation, "superseded follow-up chain");
        }

        st.next_generation += 1;
        let generation = st.next_generation;
        let cancel = CancellationToken::new();

        let scheduler = self.clone();
        let token = cancel.clone();
        let chain = Chain {
            user_id,
            chat_id,
            session,
            generation,
            probability: initial_probability,
        };
        let handle = tokio::spawn(async move {
            scheduler.run_chain(chain, token).await;
        });

        st.chains.insert(
            user_id,
            ChainEntry {
                generation,
                cancel,
                handle,
            },
        );
        tracing::debug!(%user_id, %chat_id, generation, probability = initial_probability, "follow-up chain started");
    }

    /// Stop the user's chain if one is running. Returns whether one was.
    pub async fn cancel(&self, user_id: UserId) -> bool {
        let entry = self.inner.state.lock().await.chains.remove(&user_id);
        match entry {
            Some(entry) => {
                // The task exits at its next check; the handle is detached, never aborted.
                entry.cancel.cancel();
                tracing::debug!(%user_id, generation = entry.generation, "follow-up chain cancelled");
                true
            }
            None => false,
        }
    }

    pub async fn is_pending(&self, user_id: UserId) -> bool {
        self.inner.state.lock().await.chains.contains_key(&user_id)
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.chains.len()
    }

    /// Cancel every chain and wait for them to wind down.
    pub async fn shutdown(&self) {
        let entries: Vec<ChainEntry> = {
            let mut st = self.inner.state.lock().await;
            st.chains.drain().map(|(_, e)| e).collect()
        };
        for entry in &entries {
            entry.cancel.cancel();
        }
        for entry in entries {
            let _ = entry.handle.await;
        }
    }

    async fn run_chain(&self, chain: Chain, cancel: CancellationToken) {
        let Chain {
            user_id,
            chat_id,
            session,
            generation,
            mut probability,
        } = chain;

        let cfg = self.inner.cfg;
        let mut sent = 0usize;

        let end = loop {
            let delay = self.inner.dice.delay(cfg.delay_min, cfg.delay_max);
            tokio::select! {
              biased;
              _ = cancel.cancelled() => break ChainEnd::Cancelled,
              _ = sleep(delay) => {}
            }

            if !self.inner.dice.roll(probability) {
                break ChainEnd::RollFailed;
            }

            let text = match session.send(MessageContent::text(FOLLOWUP_PROMPT)).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(%user_id, error = %e, "follow-up backend call failed");
                    FOLLOWUP_FALLBACK.to_string()
                }
            };

            // A /clear or new message may have landed during the call.
            if cancel.is_cancelled() {
                tracing::debug!(%user_id, "discarding follow-up of a cancelled chain");
                break ChainEnd::Cancelled;
            }

            if let Err(e) = self
                .inner
                .history
                .append(user_id, FOLLOWUP_LOG_INPUT, Some(&text))
                .await
            {
                tracing::warn!(%user_id, error = %e, "failed to log follow-up");
            }

            if let Err(e) = self.inner.channel.send_text(chat_id, &text).await {
                tracing::error!(%user_id, %chat_id, error = %e, "failed to deliver follow-up");
            }

            sent += 1;
            probability /= 2.0;
            tracing::debug!(%user_id, sent, next_probability = probability, "follow-up sent");
        };

        tracing::debug!(%user_id, generation, sent, ?end, "follow-up chain finished");
        if end == ChainEnd::RollFailed {
            self.release(user_id, generation).await;
        }
    }

    /// Drop the registry entry for a naturally finished chain, unless a newer
    /// chain has already taken its place.
    async fn release(&self, user_id: UserId, generation: u64) {
        let mut st = self.inner.state.lock().await;
        if st
            .chains
            .get(&user_id)
            .is_some_and(|e| e.generation == generation)
        {
            st.chains.remove(&user_id);
        }
    }
}
