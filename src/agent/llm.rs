//! OpenRouter chat-completions client

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{truncate_chars, GatewayError};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

// ============ Provider Configuration ============

/// Configuration for an OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Extra headers to include in requests (e.g., X-Title, HTTP-Referer)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    /// OpenRouter-compatible endpoint at a custom base URL
    pub fn openrouter_with_url(api_key: String, base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            extra_headers: vec![
                ("HTTP-Referer".to_string(), "https://github.com/tutor-agent".to_string()),
                ("X-Title".to_string(), "Tutor Agent".to_string()),
            ],
        }
    }

    /// Override the X-Title / HTTP-Referer headers
    pub fn with_app_headers(mut self, referer: &str, title: &str) -> Self {
        self.extra_headers = vec![
            ("HTTP-Referer".to_string(), referer.to_string()),
            ("X-Title".to_string(), title.to_string()),
        ];
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    /// OpenRouter middle-out transforms, always disabled
    transforms: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Chat-completions client for OpenRouter and compatible providers
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

impl OpenRouterClient {
    /// Create a client for `config` with a connect timeout on the underlying HTTP client
    pub fn with_connect_timeout(
        config: ProviderConfig,
        connect_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client: Arc::new(client), provider: config })
    }

    /// Send a chat completion request and return the assistant text.
    ///
    /// An empty string means the provider answered but produced no text;
    /// callers decide whether that is an error.
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model,
            messages,
            max_tokens,
            temperature,
            transforms: Vec::new(),
        };

        let mut req_builder = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status: status.as_u16(), body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {}", e)))?;
        debug!(model, "LLM response: {}", truncate_chars(&body, 2000));

        let raw_response: Value = serde_json::from_str(&body).map_err(|e| {
            GatewayError::Transport(format!(
                "Failed to parse JSON response: {} (body: {})",
                e,
                truncate_chars(&body, 500)
            ))
        })?;

        Ok(extract_content(&raw_response))
    }
}

/// Pull `choices[0].message.content` out of a completion response.
///
/// Handles both plain-string content and the array-of-parts form some models
/// return.
pub fn extract_content(raw_response: &Value) -> String {
    let content_value = raw_response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));

    match content_value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                    part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}
