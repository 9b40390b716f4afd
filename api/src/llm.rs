//! Model capability: a single `generate(system, user)` call, with Anthropic and
//! OpenAI-compatible backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{LlmConfig, LlmProviderType};

/// Text generation backend used by the translator.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
    /// Provider name, part of the cache key.
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
}

/// Build the configured provider. `None` when no API key is set, in which case
/// every compile goes straight to the heuristics.
pub fn get_model_provider(config: &LlmConfig) -> Option<Arc<dyn ModelProvider>> {
    let api_key = config.api_key.as_deref()?;
    match config.provider {
        LlmProviderType::Anthropic => Some(Arc::new(ClaudeClient::new(
            config.api_url(),
            config.model(),
            api_key,
            config.max_tokens,
        ))),
        LlmProviderType::OpenAi => Some(Arc::new(OpenAiClient::new(
            config.api_url(),
            config.model(),
            api_key,
            config.max_tokens,
        ))),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============================================================================
// Anthropic messages API
// ============================================================================

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(default)]
    text: String,
}

pub struct ClaudeClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl std::fmt::Debug for ClaudeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ClaudeClient {
    pub fn new(api_url: &str, model: &str, api_key: &str, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ModelProvider for ClaudeClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = ClaudeRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: user,
            }],
        };

        let resp = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send LLM API request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, body);
        }

        let body = resp
            .text()
            .await
            .context("Failed to read LLM response body")?;

        let response: ClaudeResponse = serde_json::from_str(&body).with_context(|| {
            format!(
                "Failed to parse LLM API response. Body: {}",
                truncate(&body, 500)
            )
        })?;

        response
            .content
            .into_iter()
            .map(|c| c.text)
            .find(|t| !t.is_empty())
            .context("LLM response contained no content")
    }

    fn provider(&self) -> &str {
        LlmProviderType::Anthropic.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(api_url: &str, model: &str, api_key: &str, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send LLM API request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, body);
        }

        let body = resp
            .text()
            .await
            .context("Failed to read LLM response body")?;

        let response: OpenAiResponse = serde_json::from_str(&body).with_context(|| {
            format!(
                "Failed to parse LLM API response. Body: {}",
                truncate(&body, 500)
            )
        })?;

        response
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .find(|t| !t.is_empty())
            .context("LLM response contained no content")
    }

    fn provider(&self) -> &str {
        LlmProviderType::OpenAi.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }
}
