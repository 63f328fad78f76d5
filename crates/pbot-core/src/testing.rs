//! In-memory fakes for the ports, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    backend::{ChatSession, ConversationBackend, MessageContent},
    domain::{ChatId, EntryId, MessageId, MessageRef, UserId},
    errors::Error,
    followup::FollowupDice,
    history::{ChatLogEntry, HistoryStore},
    messaging::{
        port::MessageChannel,
        types::{FileRef, InlineKeyboard},
    },
    Result,
};

/// Fixed 5s delay; rolls come from a script (exhausted script = failed roll).
#[derive(Default)]
pub struct ScriptedDice {
    rolls: Mutex<VecDeque<bool>>,
    probabilities: Mutex<Vec<f64>>,
    bounds: Mutex<Vec<(Duration, Duration)>>,
}

impl ScriptedDice {
    pub fn new(rolls: &[bool]) -> Self {
        Self {
            rolls: Mutex::new(rolls.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn push_rolls(&self, rolls: &[bool]) {
        self.rolls.lock().unwrap().extend(rolls.iter().copied());
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.probabilities.lock().unwrap().clone()
    }

    pub fn bounds(&self) -> Vec<(Duration, Duration)> {
        self.bounds.lock().unwrap().clone()
    }
}

impl FollowupDice for ScriptedDice {
    fn delay(&self, min: Duration, max: Duration) -> Duration {
        self.bounds.lock().unwrap().push((min, max));
        Duration::from_secs(5)
    }

    fn roll(&self, probability: f64) -> bool {
        self.probabilities.lock().unwrap().push(probability);
        self.rolls.lock().unwrap().pop_front().unwrap_or(false)
    }
}

/// What a fake session received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received {
    Text(String),
    Image { mime_type: String, prompt: String },
}

/// Replies `"{name} #{n}"`, or fails every call when `fail` is set.
#[derive(Default)]
pub struct FakeChat {
    pub name: String,
    pub fail: AtomicBool,
    calls: AtomicUsize,
    received: Mutex<Vec<Received>>,
}

impl FakeChat {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        let chat = Self::named("failing");
        chat.fail.store(true, Ordering::SeqCst);
        chat
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSession for FakeChat {
    async fn send(&self, content: MessageContent) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let received = match content {
            MessageContent::Text(t) => Received::Text(t),
            MessageContent::Image { image, prompt } => Received::Image {
                mime_type: image.mime_type,
                prompt,
            },
        };
        self.received.lock().unwrap().push(received);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Backend("model overloaded".to_string()));
        }
        Ok(format!("{} #{n}", self.name))
    }
}

/// Blocks inside `send` until `release` is notified.
#[derive(Default)]
pub struct GatedChat {
    pub entered: Notify,
    pub release: Notify,
    calls: AtomicUsize,
}

impl GatedChat {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatSession for GatedChat {
    async fn send(&self, _content: MessageContent) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok("late thought".to_string())
    }
}

/// Hands out `FakeChat`s replying `reply #n` and records their prompts.
#[derive(Default)]
pub struct FakeBackend {
    pub unavailable: AtomicBool,
    /// New sessions fail on `send`.
    pub failing_sessions: AtomicBool,
    sessions: Mutex<Vec<(String, Arc<FakeChat>)>>,
}

impl FakeBackend {
    /// (system prompt, session) in creation order.
    pub fn sessions(&self) -> Vec<(String, Arc<FakeChat>)> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last_session(&self) -> Option<Arc<FakeChat>> {
        self.sessions.lock().unwrap().last().map(|(_, c)| c.clone())
    }
}

#[async_trait]
impl ConversationBackend for FakeBackend {
    async fn create_session(&self, system_prompt: &str) -> Result<Arc<dyn ChatSession>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable("no api key".to_string()));
        }
        let chat = Arc::new(FakeChat::named("reply"));
        if self.failing_sessions.load(Ordering::SeqCst) {
            chat.fail.store(true, Ordering::SeqCst);
        }
        self.sessions
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), chat.clone()));
        Ok(chat)
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    rows: Mutex<Vec<ChatLogEntry>>,
    next_id: AtomicUsize,
}

impl MemoryHistory {
    pub fn rows(&self) -> Vec<ChatLogEntry> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, user: UserId, input: &str, output: Option<&str>) -> Result<EntryId> {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1);
        self.rows.lock().unwrap().push(ChatLogEntry {
            id,
            user_id: user,
            input_text: input.to_string(),
            output_text: output.map(str::to_string),
            created_at: String::new(),
        });
        Ok(id)
    }

    async fn update_output(&self, entry: EntryId, output: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.id == entry) {
            row.output_text = Some(output.to_string());
        }
        Ok(())
    }

    async fn delete_all(&self, user: UserId) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.user_id != user);
        Ok((before - rows.len()) as u64)
    }

    async fn entries(&self, user: UserId) -> Result<Vec<ChatLogEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeChannel {
    pub fail_sends: AtomicBool,
    next_id: Mutex<i32>,
    sends: Mutex<Vec<(ChatId, String)>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeChannel {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }

    pub fn put_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), bytes);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn keyboards(&self) -> Vec<(ChatId, String, InlineKeyboard)> {
        self.keyboards.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Delivery("bot was blocked by the user".to_string()));
        }
        self.sends
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn download_image(&self, file: &FileRef) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&file.0)
            .cloned()
            .ok_or_else(|| Error::Delivery(format!("file {} not found", file.0)))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.keyboards
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// A tiny valid PNG.
pub fn tiny_png() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(3, 2));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}
