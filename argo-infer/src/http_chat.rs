use std::time::Duration;

use argo_types::{CompletionRequest, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CompletionService, LlmError};

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone, Debug)]
pub struct HttpChatSettings {
    /// Base of an OpenAI-compatible API, e.g. `https://api.groq.com/openai/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    /// Per-attempt deadline.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Completion engine for any OpenAI-compatible chat-completions endpoint (Groq, vLLM, ...).
pub struct HttpChatEngine {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpChatEngine {
    pub fn new(settings: HttpChatSettings) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            retry: settings.retry,
        })
    }

    async fn complete_once(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAIChatRequest {
            model: &req.model,
            messages: vec![OpenAIMessage {
                role: "user",
                content: &req.prompt,
            }],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await.map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletion = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else {
                LlmError::Parse(e.to_string())
            }
        })?;
        first_choice_text(parsed)
    }
}

fn classify_transport(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(e.to_string())
    } else {
        LlmError::Transport(e.to_string())
    }
}

fn first_choice_text(parsed: ChatCompletion) -> Result<String, LlmError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(LlmError::Empty)
}

#[async_trait]
impl CompletionService for HttpChatEngine {
    async fn complete(&self, req: CompletionRequest) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.complete_once(&req).await {
                Ok(text) => {
                    debug!(model = %req.model, attempt, chars = text.len(), "completion ok");
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(model = %req.model, attempt, ?delay, error = %e, "completion failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
