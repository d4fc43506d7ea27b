//! Language-model call contract and implementations.
//!
//! The engine consumes the model through a narrow interface: retrieved
//! context plus conversation history in, answer text out. Any failure
//! (network, quota, malformed response) surfaces as a single error; the
//! engine boundary decides how to degrade.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::{ChatRole, HistoryTurn};

/// System prompt framing the retrieved fragments for the model.
const SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about uploaded \
documents. Use the following pieces of context to answer the question. If the context does \
not contain the answer, say that you don't know rather than inventing one.\n\nContext:\n";

/// Trait for answer-synthesis models.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"mixtral-8x7b-32768"`).
    fn model_name(&self) -> &str;

    /// Generate an answer for `question`, grounded in `context` (the
    /// concatenated retrieved fragments) and the prior `history` turns.
    async fn generate(
        &self,
        context: &str,
        history: &[HistoryTurn],
        question: &str,
    ) -> Result<String>;
}

// ============ Disabled Provider ============

/// A no-op model that always returns errors; used when `llm.provider =
/// "disabled"` in the configuration.
pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(
        &self,
        _context: &str,
        _history: &[HistoryTurn],
        _question: &str,
    ) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

// ============ OpenAI-compatible Provider ============

/// Chat model calling an OpenAI-compatible `POST {api_base}/chat/completions`
/// endpoint. The default configuration targets Groq; `provider = "openai"`
/// selects the `OPENAI_API_KEY` environment variable instead of
/// `GROQ_API_KEY`.
pub struct OpenAiChatModel {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let env_var = match config.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GROQ_API_KEY",
        };
        let api_key = std::env::var(env_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", env_var))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }

    fn build_messages(
        &self,
        context: &str,
        history: &[HistoryTurn],
        question: &str,
    ) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(serde_json::json!({
            "role": "system",
            "content": format!("{}{}", SYSTEM_PROMPT, context),
        }));
        for turn in history {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(serde_json::json!({ "role": role, "content": turn.content }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": question }));
        messages
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        context: &str,
        history: &[HistoryTurn],
        question: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": self.build_messages(context, history, question),
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Chat API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Chat API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chat completion failed after retries")))
    }
}

/// Extract `choices[0].message.content` from an OpenAI-shaped completion.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing content"))
}

/// Create the appropriate [`ChatModel`] based on configuration.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "groq" | "openai" => Ok(Arc::new(OpenAiChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
