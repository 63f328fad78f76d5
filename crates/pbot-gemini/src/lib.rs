//! Gemini adapter (`generateContent` REST endpoint).
//!
//! The endpoint is stateless, so a chat session keeps its own turn history
//! and replays it with every request.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use pbot_core::{
    backend::{ChatSession, ConversationBackend, MessageContent},
    config::Config,
    errors::Error,
    Result,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.gemini_api_key.clone(),
            cfg.gemini_model.clone(),
            cfg.gemini_base_url.clone(),
            cfg.gemini_timeout,
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ConversationBackend for GeminiBackend {
    async fn create_session(&self, system_prompt: &str) -> Result<Arc<dyn ChatSession>> {
        if self.api_key.trim().is_empty() {
            return Err(Error::BackendUnavailable("GEMINI_API_KEY is empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::BackendUnavailable("no Gemini model configured".to_string()));
        }

        Ok(Arc::new(GeminiChat {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            endpoint: self.endpoint(),
            system_instruction: Content::system(system_prompt),
            history: Mutex::new(Vec::new()),
        }))
    }
}

/// One persona conversation. Turns are appended only after a successful reply.
pub struct GeminiChat {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    system_instruction: Content,
    history: Mutex<Vec<Content>>,
}

#[cfg(test)]
impl GeminiChat {
    /// Number of stored turns (user and model).
    async fn turns(&self) -> usize {
        self.history.lock().await.len()
    }
}

#[async_trait]
impl ChatSession for GeminiChat {
    async fn send(&self, content: MessageContent) -> Result<String> {
        // Held across the request so concurrent sends cannot interleave turns.
        let mut history = self.history.lock().await;

        let user_turn = Content::user(&content);
        let mut contents = history.clone();
        contents.push(user_turn.clone());
        let request = GenerateContentRequest {
            system_instruction: Some(self.system_instruction.clone()),
            contents,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("failed to parse gemini response: {e}")))?;
        let text = extract_text(parsed)?;

        history.push(user_turn);
        history.push(Content::model(&text));
        tracing::debug!(turns = history.len(), "gemini reply received");
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Clone, Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

impl Content {
    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }
    }

    fn user(content: &MessageContent) -> Self {
        let parts = match content {
            MessageContent::Text(text) => vec![Part::Text { text: text.clone() }],
            MessageContent::Image { image, prompt } => vec![
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: BASE64_STANDARD.encode(&image.bytes),
                    },
                },
                Part::Text {
                    text: prompt.clone(),
                },
            ],
        };
        Self {
            role: Some("user"),
            parts,
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: Some("model"),
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Concatenated text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .filter(|text| !text.trim().is_empty());

    match text {
        Some(text) => Ok(text),
        None => {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!(" (blocked: {r})"))
                .unwrap_or_default();
            Err(Error::Backend(format!("gemini returned no text{reason}")))
        }
    }
}

fn map_http_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| {
            let msg = w.error.message?;
            Some(match w.error.status {
                Some(s) if !s.is_empty() => format!("{s}: {msg}"),
                _ => msg,
            })
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    Error::Backend(format!("gemini returned {status}: {message}"))
}
