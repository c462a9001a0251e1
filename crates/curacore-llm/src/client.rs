//! Backend construction from application config.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{MockBackend, SharedBackend};
use crate::error::{LlmError, Result};
use crate::ollama::{OllamaBackend, OllamaConfig};
use crate::openai::{OpenAiBackend, OpenAiConfig};

/// Provider-agnostic description of the generation backend to build.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    /// "ollama", "openai", or "mock".
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl BackendSpec {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            base_url: None,
            api_key: None,
            timeout: Duration::from_secs(120),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Build a [`SharedBackend`] from a spec.
pub fn build_backend(spec: &BackendSpec) -> Result<SharedBackend> {
    tracing::debug!(provider = %spec.provider, model = %spec.model, "Building generation backend");

    match spec.provider.as_str() {
        "ollama" => {
            let mut config = OllamaConfig::default()
                .with_model(&spec.model)
                .with_timeout(spec.timeout)
                .with_retries(spec.max_retries, spec.retry_backoff);
            if let Some(ref url) = spec.base_url {
                config = config.with_base_url(url);
            }
            Ok(Arc::new(OllamaBackend::new(config)?))
        }
        "openai" => {
            let mut config = OpenAiConfig::openai(spec.api_key.clone())
                .with_model(&spec.model)
                .with_timeout(spec.timeout)
                .with_retries(spec.max_retries, spec.retry_backoff);
            if let Some(ref url) = spec.base_url {
                config = config.with_base_url(url);
            }
            if config.api_key.is_none() && config.base_url.contains("api.openai.com") {
                return Err(LlmError::Config(
                    "OpenAI backend requires an API key".to_string(),
                ));
            }
            Ok(Arc::new(OpenAiBackend::new(config)?))
        }
        // An empty script: every call reports the model as unreachable, which
        // exercises the advisory fallbacks end to end.
        "mock" => Ok(Arc::new(MockBackend::unavailable())),
        other => Err(LlmError::Config(format!(
            "Unknown LLM backend '{}'. Valid: ollama, openai, mock",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ollama() {
        let backend = build_backend(&BackendSpec::new("ollama", "gemma:2b")).unwrap();
        assert_eq!(backend.name(), "ollama");
    }

    #[test]
    fn test_build_openai_requires_key() {
        assert!(build_backend(&BackendSpec::new("openai", "gpt-4o-mini")).is_err());

        let mut spec = BackendSpec::new("openai", "gpt-4o-mini");
        spec.api_key = Some("sk-test".to_string());
        assert_eq!(build_backend(&spec).unwrap().name(), "openai");
    }

    #[test]
    fn test_build_unknown() {
        assert!(matches!(
            build_backend(&BackendSpec::new("anthropic", "x")),
            Err(LlmError::Config(_))
        ));
    }
}
