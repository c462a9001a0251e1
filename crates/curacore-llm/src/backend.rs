//! Generation backend trait and implementations.
//!
//! The triage core treats the generation model as a black box mapping a
//! prompt to text. This module defines that seam and a scripted mock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with bounded exponential backoff.
///
/// Retries only on transient errors (network failures, rate limits).
/// Non-retryable errors, timeouts included, are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A generation model provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run a single non-streaming completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted reply of a [`MockBackend`].
#[derive(Debug)]
pub enum MockResponse {
    Text(String),
    Error(LlmError),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A transport failure, as if the model server were down.
    pub fn unavailable() -> Self {
        Self::Error(LlmError::Network("connection refused".to_string()))
    }
}

/// A mock backend for testing.
///
/// Returns scripted replies in order. Once the script is exhausted every
/// call fails with a backend error.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<MockResponse>>,
    request_log: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
    /// Fail with a transport error once the script runs out.
    unavailable: bool,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses.into()),
            request_log: Mutex::new(Vec::new()),
            delay: None,
            unavailable: false,
        }
    }

    /// A mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::text(text)])
    }

    /// A mock backend replying with each text in turn.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(MockResponse::text).collect())
    }

    /// A mock backend whose every call fails with a transport error.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sleep before answering, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue another scripted reply.
    pub fn push(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// All requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        self.request_log.lock().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().pop_front();
        match next {
            Some(MockResponse::Text(text)) => Ok(CompletionResponse::new(
                format!("mock_{}", uuid::Uuid::new_v4()),
                model,
                text,
                StopReason::EndTurn,
                Usage::new(10, 20),
            )),
            Some(MockResponse::Error(e)) => Err(e),
            None if self.unavailable => {
                Err(LlmError::Network("connection refused".to_string()))
            }
            None => Err(LlmError::Backend(
                "MockBackend: no more responses available".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
