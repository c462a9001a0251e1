//! Native Ollama backend.
//!
//! Talks to `POST /api/chat` directly so that sampling options Ollama only
//! exposes natively (`num_ctx`) reach the model.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::backend::{LlmBackend, with_retry};
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    /// Model override; when unset the request's model is used.
    pub model: Option<String>,
    /// Local inference on CPU can be slow, so the default is generous.
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE.to_string(),
            model: None,
            timeout: Duration::from_secs(600),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl OllamaConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        // Accept the OpenAI-compatible URL people tend to paste.
        let url = url.into();
        self.base_url = url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();
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

pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn to_ollama_request(&self, request: &CompletionRequest) -> OllamaChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        OllamaChatRequest {
            model: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| request.model.clone()),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_ctx: request.max_context,
                num_predict: Some(request.max_tokens),
            },
        }
    }

    async fn handle_response(response: Response) -> Result<CompletionResponse> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));
            return Err(match status.as_u16() {
                // Unknown model: a configuration problem, not a transient one.
                404 => LlmError::Config(message),
                400 => LlmError::InvalidRequest(message),
                503 => LlmError::Network(message),
                _ => LlmError::Backend(message),
            });
        }

        let parsed: OllamaChatResponse = serde_json::from_str(&body)?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let ollama_request = self.to_ollama_request(&request);
        let url = format!("{}/api/chat", self.config.base_url);

        tracing::debug!(
            model = %ollama_request.model,
            messages = ollama_request.messages.len(),
            num_ctx = ?ollama_request.options.num_ctx,
            "Sending Ollama chat request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "ollama",
            || async {
                let response = self.client.post(&url).json(&ollama_request).send().await?;
                Self::handle_response(response).await
            },
        )
        .await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::Backend(format!(
                "Ollama health check returned {}",
                response.status()
            )))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    created_at: String,
    message: Option<OllamaMessage>,
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

impl From<OllamaChatResponse> for CompletionResponse {
    fn from(resp: OllamaChatResponse) -> Self {
        CompletionResponse {
            id: format!("ollama_{}", resp.created_at),
            model: resp.model,
            content: resp.message.map(|m| m.content).unwrap_or_default(),
            stop_reason: resp.done_reason.as_deref().map(StopReason::from_provider),
            usage: Usage::new(resp.prompt_eval_count, resp.eval_count),
        }
    }
}
