//! Prompt construction and the grounded answer call.
use tracing::debug;

use crate::llm::{ChatModel, CompletionRequest, LlmError};

pub const SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant. Answer concisely and \
accurately using only the supplied context. If the context is not sufficient, do not guess; \
reply that the available documents do not allow a definite answer.";

/// Sampling parameters for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub language: Option<String>,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            language: None,
        }
    }
}

fn instruction(language: Option<&str>) -> String {
    let base = "Summarize the key points concisely. Briefly mention the supporting context where relevant.";
    match language {
        Some(lang) => format!("Answer in {lang}. {base}"),
        None => base.to_string(),
    }
}

/// Render the user message: the question, numbered context blocks, then the
/// answer instruction.
#[must_use]
pub fn build_user_prompt<S: AsRef<str>>(query: &str, contexts: &[S], language: Option<&str>) -> String {
    let blocks = contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[CONTEXT {}]\n{}", i + 1, c.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context:\n{blocks}\n\nQuestion:\n{query}\n\n{}",
        instruction(language)
    )
}

/// Ask `model` to answer `query` from `contexts`. The reply is trimmed; an
/// empty reply is returned as an empty string.
pub async fn answer<S: AsRef<str>>(
    model: &dyn ChatModel,
    query: &str,
    contexts: &[S],
    options: &AnswerOptions,
) -> Result<String, LlmError> {
    let request = CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: build_user_prompt(query, contexts, options.language.as_deref()),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    };
    debug!(
        "Answering with {} contexts via {}",
        contexts.len(),
        model.model_name()
    );

    let reply = model.complete(&request).await?;
    Ok(reply.trim().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed reply and records every request.
    pub(crate) struct ScriptedModel {
        reply: Result<String, String>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(LlmError::Request)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_user_prompt_layout() {
        let prompt = build_user_prompt("What is X?", &["alpha", "beta"], None);
        assert_eq!(
            prompt,
            "Context:\n[CONTEXT 1]\nalpha\n\n[CONTEXT 2]\nbeta\n\nQuestion:\nWhat is X?\n\n\
             Summarize the key points concisely. Briefly mention the supporting context where relevant."
        );
    }

    #[test]
    fn test_user_prompt_language() {
        let prompt = build_user_prompt("q", &["c"], Some("Japanese"));
        assert!(prompt.ends_with("Answer in Japanese. Summarize the key points concisely. Briefly mention the supporting context where relevant."));
    }

    #[tokio::test]
    async fn test_answer_is_trimmed() {
        let model = ScriptedModel::replying("  The answer.\n");
        let out = answer(&model, "q", &["ctx"], &AnswerOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "The answer.");

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, SYSTEM_PROMPT);
        assert_eq!(requests[0].max_tokens, 512);
        assert!(requests[0].user.contains("[CONTEXT 1]\nctx"));
    }

    #[tokio::test]
    async fn test_empty_reply_stays_empty() {
        let model = ScriptedModel::replying("   ");
        let out = answer(&model, "q", &Vec::<String>::new(), &AnswerOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let model = ScriptedModel::failing("connection refused");
        let err = answer(&model, "q", &["c"], &AnswerOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Request(m) if m == "connection refused"));
    }
}
