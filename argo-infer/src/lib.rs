use argo_types::CompletionRequest;
use async_trait::async_trait;
use thiserror::Error;

pub mod http_chat;
pub use http_chat::{HttpChatEngine, HttpChatSettings};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion timed out: {0}")]
    Timeout(String),
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response unreadable: {0}")]
    Parse(String),
    #[error("completion service returned no text")]
    Empty,
}

impl LlmError {
    /// Hangs, dropped connections, rate limiting and server errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Parse(_) | LlmError::Empty => false,
        }
    }
}

/// Hosted text-completion model: one prompt in, one text out. Stateless per call.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String, LlmError>;
}
