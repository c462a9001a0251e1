//! Wires configuration into the triage services shared by all commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use curacore_config::{CuracoreConfig, EmbeddingConfig, EmbeddingProvider, LlmConfig};
use curacore_corpus::CorpusIndex;
use curacore_llm::{BackendSpec, EmbedderSpec, SharedEmbedder, build_backend, build_embedder};
use curacore_session::SessionCache;
use curacore_triage::{
    ContextAssembler, CorpusIngestor, DoctorSummarizer, GroundedAnswerer, ReasoningInvoker,
    Retriever, SafetyGate, Session, SessionManager, SessionStore, TriageEngine, cache_config,
};

pub fn backend_spec(llm: &LlmConfig) -> BackendSpec {
    BackendSpec {
        provider: llm.backend.display_name().to_ascii_lowercase(),
        model: llm.model.clone(),
        base_url: llm.base_url.clone(),
        api_key: llm.resolve_api_key(),
        timeout: Duration::from_secs(llm.timeout_secs),
        max_retries: llm.max_retries,
        retry_backoff: Duration::from_millis(llm.retry_backoff_ms),
    }
}

pub fn embedder_spec(embedding: &EmbeddingConfig) -> EmbedderSpec {
    let provider = match embedding.provider {
        EmbeddingProvider::Local => "local",
        EmbeddingProvider::OpenAi => "openai",
        EmbeddingProvider::Mock => "mock",
    };
    EmbedderSpec {
        provider: provider.to_string(),
        dimensions: embedding.effective_dimensions(),
        model: embedding.model.clone(),
        base_url: embedding.base_url.clone(),
        api_key: embedding.api_key.clone(),
        model_dir: Some(embedding.resolved_model_dir()),
    }
}

/// Embedder plus the corpus index it is paired with.
pub struct Corpus {
    pub embedder: SharedEmbedder,
    pub index: Arc<CorpusIndex>,
}

impl Corpus {
    pub fn open(config: &CuracoreConfig) -> Result<Self> {
        let embedder = build_embedder(&embedder_spec(&config.embedding()))
            .context("Failed to build embedder")?;
        let corpus = config.corpus();
        let path = corpus.database_path();
        let index = CorpusIndex::open(
            &path,
            &corpus.collection,
            embedder.dimensions(),
            embedder.name(),
        )
        .with_context(|| format!("Failed to open corpus at {}", path.display()))?;
        Ok(Self {
            embedder,
            index: Arc::new(index),
        })
    }

    pub fn retriever(&self, config: &CuracoreConfig) -> Result<Retriever> {
        Ok(Retriever::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            &config.retrieval(),
        )?)
    }

    pub fn ingestor(&self, config: &CuracoreConfig) -> Result<CorpusIngestor> {
        Ok(CorpusIngestor::from_config(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            &config.corpus(),
        )?)
    }
}

/// Everything that talks to the generation model.
pub struct Services {
    pub config: CuracoreConfig,
    pub retriever: Arc<Retriever>,
    pub invoker: Arc<ReasoningInvoker>,
    pub gate: SafetyGate,
}

impl Services {
    pub fn build(config: &CuracoreConfig) -> Result<Self> {
        let corpus = Corpus::open(config)?;
        let retriever = Arc::new(corpus.retriever(config)?);

        let llm = config.llm();
        let backend = build_backend(&backend_spec(&llm)).context("Failed to build LLM backend")?;
        let invoker = ReasoningInvoker::from_config(backend, &llm, &config.triage())?;
        let gate = SafetyGate::with_extra(&config.triage().extra_emergency_phrases);

        Ok(Self {
            config: config.clone(),
            retriever,
            invoker: Arc::new(invoker),
            gate,
        })
    }

    fn assembler(&self) -> ContextAssembler {
        let triage = self.config.triage();
        ContextAssembler::new(triage.max_context_tokens, triage.reserved_response_tokens)
    }

    pub fn engine(&self) -> TriageEngine {
        TriageEngine::from_config(
            Arc::clone(&self.retriever),
            Arc::clone(&self.invoker),
            &self.config.triage(),
        )
    }

    /// Session manager over a fresh in-memory cache.
    pub fn session_manager(&self, retain_completed: bool) -> (SessionManager, SessionCache<Session>) {
        let config = cache_config(&self.config.session());
        let cache = SessionCache::<Session>::new(config.clone());
        let store: Arc<dyn SessionStore> = Arc::new(cache.clone());
        let manager = SessionManager::new(store, Arc::new(self.engine()))
            .with_completed_archive(SessionCache::new(config))
            .with_retain_completed(retain_completed);
        (manager, cache)
    }

    pub fn summarizer(&self) -> DoctorSummarizer {
        DoctorSummarizer::new(Arc::clone(&self.invoker))
    }

    pub fn answerer(&self) -> GroundedAnswerer {
        GroundedAnswerer::new(
            self.gate.clone(),
            Arc::clone(&self.retriever),
            Arc::clone(&self.invoker),
            self.assembler(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curacore_config::Backend;

    #[test]
    fn test_backend_spec_from_config() {
        let llm = LlmConfig {
            backend: Backend::Openai,
            model: "gpt-4o-mini".to_string(),
            api_key: Some("sk-test".to_string()),
            max_retries: 2,
            ..LlmConfig::default()
        };
        let spec = backend_spec(&llm);
        assert_eq!(spec.provider, "openai");
        assert_eq!(spec.api_key.as_deref(), Some("sk-test"));
        assert_eq!(spec.max_retries, 2);
    }

    #[test]
    fn test_embedder_spec_defaults() {
        let spec = embedder_spec(&EmbeddingConfig::default());
        assert_eq!(spec.provider, "local");
        assert_eq!(spec.dimensions, 384);
        assert!(spec.model_dir.is_some());
    }

    #[test]
    fn test_services_with_mock_stack() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[llm]\nbackend = \"mock\"\n\n[embedding]\nprovider = \"mock\"\ndimensions = 8\n\n[corpus]\ndatabase = {:?}\n",
            dir.path().join("corpus.db")
        );
        let config = CuracoreConfig::from_toml(&toml).unwrap();
        let services = Services::build(&config).unwrap();
        assert_eq!(services.invoker.backend_name(), "mock");
        assert_eq!(services.retriever.k(), 3);
    }
}
