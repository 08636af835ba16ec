//! Language-model client used by the answer assembler.
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiChatModel;

/// Errors raised by a chat model call.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request to language model failed: {0}")]
    Request(String),

    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed language model response: {0}")]
    Response(String),
}

/// One non-streaming completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one request and return the raw completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Model identifier, for reporting.
    fn model_name(&self) -> &str;
}
