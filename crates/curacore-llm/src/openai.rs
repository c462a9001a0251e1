//! OpenAI-compatible chat completions backend.
//!
//! Works against OpenAI itself and any service exposing the same
//! `/chat/completions` shape (vLLM, llama.cpp server, Ollama's `/v1`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

/// Default OpenAI API base URL.
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key (optional for local services).
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model override; when unset the request's model is used.
    pub model: Option<String>,
    pub timeout: Duration,
    /// Maximum retries for transient errors.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Name for this backend instance.
    pub name: String,
}

impl OpenAiConfig {
    pub fn openai(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            name: "openai".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");
        match self.config.api_key {
            Some(ref api_key) => builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key)),
            None => builder,
        }
    }

    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAiChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenAiMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        OpenAiChatRequest {
            model: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            stream: false,
        }
    }

    async fn handle_response(response: Response) -> Result<CompletionResponse> {
        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        let body = response.text().await?;
        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        Ok(parsed.into())
    }

    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimit(RateLimitInfo::from_header(message, retry_after.as_deref())),
            400 | 404 | 422 => LlmError::InvalidRequest(message),
            500..=599 => LlmError::Backend(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let openai_request = self.to_openai_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %openai_request.model,
            messages = openai_request.messages.len(),
            "Sending OpenAI-compatible request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self
                    .add_headers(self.client.post(self.completions_url()))
                    .json(&openai_request)
                    .send()
                    .await?;
                Self::handle_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .add_headers(self.client.get(format!("{}/models", self.config.base_url)))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::handle_error_response(response).await)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

impl From<OpenAiChatResponse> for CompletionResponse {
    fn from(resp: OpenAiChatResponse) -> Self {
        let choice = resp.choices.into_iter().next();
        let (content, stop_reason) = match choice {
            Some(c) => (
                c.message.content.unwrap_or_default(),
                c.finish_reason.as_deref().map(StopReason::from_provider),
            ),
            None => (String::new(), None),
        };
        let usage = resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        CompletionResponse {
            id: resp.id,
            model: resp.model,
            content,
            stop_reason,
            usage,
        }
    }
}
