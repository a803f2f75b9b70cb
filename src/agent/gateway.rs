//! LLM invocation gateway
//!
//! One call contract for every stage: a purpose, a system prompt, a user
//! prompt and a temperature in, completion text out. The gateway never
//! retries; retry and fallback policy belong to the callers.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::agent::llm::{ChatMessage, OpenRouterClient, ProviderConfig};
use crate::config::Config;
use crate::error::GatewayError;
use crate::orchestrator::router::{ModelRouter, Purpose};

/// Temperature for calls that do not ask for something specific
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// A single model call
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    pub purpose: Purpose,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
}

impl GatewayRequest {
    pub fn new(
        purpose: Purpose,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            purpose,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature,
        }
    }
}

/// Uniform call contract to a purpose-routed model
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Run one completion and return its text
    async fn invoke(&self, request: GatewayRequest) -> Result<String, GatewayError>;
}

/// Gateway handle shared by every stage of a cycle
pub type SharedGateway = Arc<dyn LlmGateway>;

/// Gateway backed by OpenRouter chat completions
pub struct OpenRouterGateway {
    client: OpenRouterClient,
    router: ModelRouter,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenRouterGateway {
    pub fn new(client: OpenRouterClient, router: ModelRouter, timeout: Duration) -> Self {
        Self {
            client,
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            router,
            timeout,
        }
    }

    /// Build from configuration, reading the API key from env/keyring
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = crate::security::get_api_key()?;
        let provider =
            ProviderConfig::openrouter_with_url(api_key, config.openrouter.base_url.clone())
                .with_app_headers(&config.openrouter.referer, &config.openrouter.title);
        let client = OpenRouterClient::with_connect_timeout(
            provider,
            Duration::from_secs(config.gateway.connect_timeout_secs),
        )?;
        let router = ModelRouter::new(config.models.clone(), config.gateway.max_tokens);

        Ok(Self {
            client,
            router,
            max_tokens: config.gateway.max_tokens,
            timeout: Duration::from_secs(config.gateway.request_timeout_secs),
        })
    }
}

#[async_trait]
impl LlmGateway for OpenRouterGateway {
    async fn invoke(&self, request: GatewayRequest) -> Result<String, GatewayError> {
        let route = self.router.route(request.purpose);
        let max_tokens = route.max_tokens.min(self.max_tokens);
        let messages = [
            ChatMessage::system(request.system_prompt),
            ChatMessage::user(request.user_prompt),
        ];

        debug!(
            purpose = %request.purpose,
            model = %route.model,
            temperature = request.temperature,
            "Invoking LLM"
        );

        let result = tokio::time::timeout(
            self.timeout,
            self.client
                .complete(&route.model, &messages, request.temperature, Some(max_tokens)),
        )
        .await;

        match result {
            Err(_) => Err(GatewayError::Timeout { secs: self.timeout.as_secs() }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(text)) if text.trim().is_empty() => {
                Err(GatewayError::EmptyResponse { model: route.model })
            }
            Ok(Ok(text)) => Ok(text),
        }
    }
}

enum Reply {
    Text(String),
    Fail(GatewayError),
}

struct Rule {
    needle: String,
    purpose: Option<Purpose>,
    replies: VecDeque<Reply>,
}

impl Rule {
    fn matches(&self, request: &GatewayRequest) -> bool {
        self.purpose.map_or(true, |p| p == request.purpose)
            && (request.system_prompt.contains(&self.needle)
                || request.user_prompt.contains(&self.needle))
    }

    /// Pop the next reply; the last one repeats forever
    fn next_reply(&mut self) -> Result<String, GatewayError> {
        let reply = if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            None
        };
        let reply = match &reply {
            Some(r) => r,
            None => match self.replies.front() {
                Some(r) => r,
                None => return Err(GatewayError::EmptyResponse { model: "scripted".to_string() }),
            },
        };
        match reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(err) => Err(err.clone()),
        }
    }
}

/// Deterministic gateway for tests and offline runs.
///
/// Rules match on a substring of the system or user prompt (optionally
/// restricted to one purpose) and are tried in insertion order. Every request
/// is recorded so tests can assert on what the pipeline asked for.
#[derive(Default)]
pub struct ScriptedGateway {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request whose prompts contain `needle` with `response`
    pub fn on(self, needle: &str, response: impl Into<String>) -> Self {
        self.push_rule(needle, None, vec![Reply::Text(response.into())])
    }

    /// Answer successive matching requests with `responses` in order,
    /// repeating the last one once exhausted
    pub fn on_sequence<I, S>(self, needle: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies = responses.into_iter().map(|r| Reply::Text(r.into())).collect();
        self.push_rule(needle, None, replies)
    }

    /// Like [`ScriptedGateway::on`] but only for one purpose
    pub fn on_purpose(self, purpose: Purpose, needle: &str, response: impl Into<String>) -> Self {
        self.push_rule(needle, Some(purpose), vec![Reply::Text(response.into())])
    }

    /// Fail every request whose prompts contain `needle`
    pub fn fail_on(self, needle: &str, error: GatewayError) -> Self {
        self.push_rule(needle, None, vec![Reply::Fail(error)])
    }

    fn push_rule(self, needle: &str, purpose: Option<Purpose>, replies: Vec<Reply>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                needle: needle.to_string(),
                purpose,
                replies: replies.into(),
            });
        }
        self
    }

    /// Every request seen so far, oldest first
    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests seen with the given purpose
    pub fn count(&self, purpose: Purpose) -> usize {
        self.requests().iter().filter(|r| r.purpose == purpose).count()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn invoke(&self, request: GatewayRequest) -> Result<String, GatewayError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let mut rules = self
            .rules
            .lock()
            .map_err(|_| GatewayError::NotConfigured("scripted gateway poisoned".to_string()))?;
        match rules.iter_mut().find(|rule| rule.matches(&request)) {
            Some(rule) => rule.next_reply(),
            None => Err(GatewayError::NotConfigured(format!(
                "no scripted response for {} request",
                request.purpose
            ))),
        }
    }
}
