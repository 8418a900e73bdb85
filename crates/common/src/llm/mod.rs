//! Chat completion client
//!
//! Wraps a chat/completions endpoint: a list of role-tagged messages in,
//! one answer string out. Single attempt, bounded by a request timeout.

use crate::config::ChatConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{ChatMessage, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for chat completion
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Produce the assistant reply for the given messages
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

fn validate_request(messages: &[ChatMessage], max_tokens: u32) -> Result<()> {
    if messages.is_empty() {
        return Err(AppError::invalid_input("chat completion needs at least one message"));
    }
    if max_tokens == 0 {
        return Err(AppError::invalid_input("max_tokens must be at least 1"));
    }
    Ok(())
}

/// OpenAI chat completion client
pub struct OpenAIChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatClient {
    /// Create a new chat client
    pub fn new(api_key: String, config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
        })
    }

    async fn call_llm(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ChatCompletion {
                message: if e.is_timeout() {
                    format!("LLM API request timed out: {}", e)
                } else {
                    format!("LLM API request failed: {}", e)
                },
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ChatCompletion {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let body = response.text().await.map_err(|e| AppError::ChatCompletion {
            message: format!("Failed to read LLM response: {}", e),
        })?;

        parse_chat_response(&body)
    }
}

/// Pull the first choice's content out of a chat completion body.
pub(crate) fn parse_chat_response(body: &str) -> Result<String> {
    let chat_response: ChatResponse =
        serde_json::from_str(body).map_err(|e| AppError::ChatCompletion {
            message: format!("Failed to parse LLM response: {}", e),
        })?;

    chat_response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AppError::ChatCompletion {
            message: "Empty response from LLM".to_string(),
        })
}

#[async_trait]
impl ChatCompleter for OpenAIChatClient {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        validate_request(messages, max_tokens)?;

        let start = Instant::now();
        let result = self.call_llm(messages, max_tokens).await;
        metrics::record_completion(start.elapsed().as_secs_f64(), &self.model, result.is_ok());

        if let Err(ref e) = result {
            tracing::warn!(model = %self.model, error = %e, "Chat completion failed");
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline completer that answers with the first user message it was given.
///
/// With the responder's prompt layout that message carries the retrieved
/// context and the question, which makes the plumbing visible end to end.
#[derive(Debug, Default)]
pub struct EchoChatCompleter;

#[async_trait]
impl ChatCompleter for EchoChatCompleter {
    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<String> {
        validate_request(messages, max_tokens)?;

        let prompt = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        // Roughly four characters per token
        let budget = (max_tokens as usize).saturating_mul(4);
        Ok(prompt.chars().take(budget).collect())
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

/// Create a chat completer based on configuration
pub fn create_chat_completer(config: &ChatConfig) -> Result<Arc<dyn ChatCompleter>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "chat.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIChatClient::new(key, config)?))
        }
        "mock" => Ok(Arc::new(EchoChatCompleter)),
        other => Err(AppError::Configuration {
            message: format!("Unknown chat provider: {}", other),
        }),
    }
}
