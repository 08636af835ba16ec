use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, CompletionRequest, LlmError};
use crate::config::LlmConfig;

/// Client for any server speaking the OpenAI `/chat/completions` protocol
/// (LM Studio, Ollama, vLLM, OpenAI itself).
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<ChatCompletionContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Array(Vec<ChatCompletionContentPart>),
}

#[derive(Debug, Deserialize)]
struct ChatCompletionContentPart {
    #[serde(default)]
    text: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice; missing content is an empty answer.
    fn into_text(self) -> String {
        let Some(choice) = self.choices.into_iter().next() else {
            return String::new();
        };

        match choice.message.content {
            Some(ChatCompletionContent::Text(text)) => text,
            Some(ChatCompletionContent::Array(parts)) => {
                parts.into_iter().filter_map(|p| p.text).collect()
            }
            None => String::new(),
        }
    }
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn endpoint_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let payload = ChatCompletionPayload {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let url = self.endpoint_url();
        debug!("POST {url} (model {})", self.model);

        let mut builder = self.client.post(&url).json(&payload);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;
        Ok(parsed.into_text())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
