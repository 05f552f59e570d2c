//! Chat-completion client
//!
//! **Call path:** concurrency gate → rate limiter (when configured) → HTTP
//! request raced against the per-call timeout. A timeout or non-success
//! status surfaces as [`PipelineError::Transport`], caught at the nearest
//! per-item isolation boundary.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use trawl_common::models::TokenUsage;

use super::gate::ConcurrencyGate;
use crate::config::AiConfig;
use crate::error::{PipelineError, PipelineResult};

const USER_AGENT: &str = concat!("trawl/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// One prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw model answer plus accounting
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Handle injected into every stage that talks to a model
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Model identifier recorded on analysis packs
    fn model_id(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> PipelineResult<Completion>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ============================================================================
// HTTP client
// ============================================================================

/// OpenAI-compatible `/chat/completions` client
pub struct HttpAiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    gate: Arc<ConcurrencyGate>,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl HttpAiClient {
    pub fn new(config: &AiConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.resolve_api_key(),
            timeout: Duration::from_secs(config.timeout_secs),
            gate: ConcurrencyGate::new(config.concurrency),
            rate_limiter,
        })
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    async fn send(&self, request: &CompletionRequest) -> PipelineResult<Completion> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::Transport(format!("AI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(PipelineError::Transport(format!(
                "AI backend returned {}: {}",
                status, snippet
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Transport(format!("Failed to parse AI response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::Transport("AI response has no content".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            usage,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[async_trait]
impl AiBackend for HttpAiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> PipelineResult<Completion> {
        let _permit = self.gate.acquire().await;

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.send(request))
            .await
            .map_err(|_| {
                PipelineError::Transport(format!(
                    "AI call timed out after {} s",
                    self.timeout.as_secs()
                ))
            })?;

        debug!(
            model = %self.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "AI call finished"
        );
        result
    }
}
