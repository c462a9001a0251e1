//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]          # generation model backend
//! [embedding]    # embedding provider (must match the indexed corpus)
//! [corpus]       # vector database and chunking
//! [retrieval]    # top-k and distance threshold
//! [triage]       # reasoning step and safety gate tuning
//! [session]      # in-memory session store
//! [server]       # HTTP listener
//! [logging]      # log level and rolling JSON file output
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Application name used for platform directory resolution.
pub(crate) const APP_NAME: &str = "curacore";

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "CURACORE_LLM_API_KEY";

/// Triage colors accepted for `triage.default_color`, most to least urgent.
pub const TRIAGE_COLORS: [&str; 5] = ["RED", "ORANGE", "YELLOW", "GREEN", "BLUE"];

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override holding only `[llm]`) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CuracoreConfig {
    pub llm: Option<LlmConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub corpus: Option<CorpusConfig>,
    pub retrieval: Option<RetrievalConfig>,
    pub triage: Option<TriageConfig>,
    pub session: Option<SessionConfig>,
    pub server: Option<ServerConfig>,
    pub logging: Option<LoggingConfig>,
}

impl CuracoreConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with every section populated with its defaults.
    pub fn with_defaults() -> Self {
        Self {
            llm: Some(LlmConfig::default()),
            embedding: Some(EmbeddingConfig::default()),
            corpus: Some(CorpusConfig::default()),
            retrieval: Some(RetrievalConfig::default()),
            triage: Some(TriageConfig::default()),
            session: Some(SessionConfig::default()),
            server: Some(ServerConfig::default()),
            logging: Some(LoggingConfig::default()),
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per section: a section present in `other` replaces the
    /// whole section here.
    pub fn merge(&mut self, other: CuracoreConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.corpus.is_some() {
            self.corpus = other.corpus;
        }
        if other.retrieval.is_some() {
            self.retrieval = other.retrieval;
        }
        if other.triage.is_some() {
            self.triage = other.triage;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    pub fn corpus(&self) -> CorpusConfig {
        self.corpus.clone().unwrap_or_default()
    }

    pub fn retrieval(&self) -> RetrievalConfig {
        self.retrieval.clone().unwrap_or_default()
    }

    pub fn triage(&self) -> TriageConfig {
        self.triage.clone().unwrap_or_default()
    }

    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check cross-field constraints on the effective configuration.
    pub fn validate(&self) -> Result<()> {
        let corpus = self.corpus();
        if corpus.chunk_size == 0 {
            return Err(ConfigError::invalid("corpus.chunk_size", "must be at least 1"));
        }
        if corpus.chunk_overlap >= corpus.chunk_size {
            return Err(ConfigError::invalid(
                "corpus.chunk_overlap",
                format!(
                    "overlap {} must be smaller than chunk_size {}",
                    corpus.chunk_overlap, corpus.chunk_size
                ),
            ));
        }
        if corpus.batch_size == 0 {
            return Err(ConfigError::invalid("corpus.batch_size", "must be at least 1"));
        }
        if !is_valid_collection_name(&corpus.collection) {
            return Err(ConfigError::invalid(
                "corpus.collection",
                "only ASCII letters, digits and '_' are allowed",
            ));
        }

        if self.retrieval().k == 0 {
            return Err(ConfigError::invalid("retrieval.k", "must be at least 1"));
        }

        if self.embedding().effective_dimensions() == 0 {
            return Err(ConfigError::invalid("embedding.dimensions", "must be at least 1"));
        }

        let triage = self.triage();
        let color = triage.default_color.to_ascii_uppercase();
        if !TRIAGE_COLORS.contains(&color.as_str()) {
            return Err(ConfigError::invalid(
                "triage.default_color",
                format!("'{}' is not one of {}", triage.default_color, TRIAGE_COLORS.join(", ")),
            ));
        }
        if !(0.0..=2.0).contains(&triage.temperature) {
            return Err(ConfigError::invalid("triage.temperature", "must be within 0.0..=2.0"));
        }
        if triage.reserved_response_tokens >= triage.max_context_tokens {
            return Err(ConfigError::invalid(
                "triage.reserved_response_tokens",
                "must be smaller than max_context_tokens",
            ));
        }

        if self.session().max_sessions == 0 {
            return Err(ConfigError::invalid("session.max_sessions", "must be at least 1"));
        }

        Ok(())
    }
}

fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Generation model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: Backend,
    /// Model identifier passed to the backend.
    pub model: String,
    /// Custom API base URL. Defaults depend on the backend.
    pub base_url: Option<String>,
    /// API key (prefer the env var; warns if set here).
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry attempts for transient transport failures. Zero disables retries.
    pub max_retries: u32,
    /// Initial backoff between retries in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Ollama,
            model: "gemma:2b".to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// API key from the config, then `CURACORE_LLM_API_KEY`, then the
    /// backend's conventional variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| read_env(API_KEY_ENV))
            .or_else(|| self.backend.env_var().and_then(read_env))
    }
}

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Native Ollama API.
    Ollama,
    /// Any OpenAI-compatible chat completions endpoint.
    Openai,
    /// Scripted responses, for tests and offline demos.
    Mock,
}

impl Backend {
    /// Conventional environment variable for this backend's API key.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Backend::Openai => Some("OPENAI_API_KEY"),
            Backend::Ollama | Backend::Mock => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Ollama => "Ollama",
            Backend::Openai => "OpenAI",
            Backend::Mock => "Mock",
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// Query and corpus must share the same provider, model and dimensions; the
/// corpus database records them and refuses a mismatch.
///
/// ```toml
/// [embedding]
/// provider = "local"
/// dimensions = 384
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "local" (ONNX), "openai", or "mock".
    pub provider: EmbeddingProvider,
    /// Output dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    /// Model name for the OpenAI-compatible provider.
    pub model: Option<String>,
    /// Base URL for the OpenAI-compatible provider.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Directory holding `model.onnx` and `tokenizer.json` for the local provider.
    pub model_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            dimensions: None,
            model: None,
            base_url: None,
            api_key: None,
            model_dir: None,
        }
    }
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            // all-MiniLM-L6-v2
            EmbeddingProvider::Local | EmbeddingProvider::Mock => 384,
            EmbeddingProvider::OpenAi => 1536,
        }
    }

    /// Local model directory, defaulting to `<data_dir>/curacore/models/all-MiniLM-L6-v2`.
    pub fn resolved_model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(|| {
            data_dir().join("models").join("all-MiniLM-L6-v2")
        })
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX Runtime inference (offline-first).
    Local,
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Deterministic hash embedder for testing.
    Mock,
}

// ─────────────────────────────────────────────────────────────────────────────
// Corpus Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Reference corpus storage and chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// SQLite database path. Defaults to `<data_dir>/curacore/corpus.db`.
    pub database: Option<PathBuf>,
    /// Collection name inside the database.
    pub collection: String,
    /// Directory scanned by `curacore ingest` when no paths are given.
    pub documents: PathBuf,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Chunks embedded and committed per batch.
    pub batch_size: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            database: None,
            collection: "medical_docs".to_string(),
            documents: PathBuf::from("documents"),
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 5000,
        }
    }
}

impl CorpusConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join("corpus.db"))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks injected into the reasoning prompt.
    pub k: usize,
    /// Chunks farther than this L2 distance are ignored.
    pub max_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 3,
            max_distance: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Triage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Reasoning step and safety gate tuning.
///
/// ```toml
/// [triage]
/// temperature = 0.1
/// default_color = "BLUE"
/// extra_emergency_phrases = ["not breathing"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Sampling temperature for the analysis call.
    pub temperature: f32,
    /// Context window of the reasoning model, in tokens.
    pub max_context_tokens: usize,
    /// Tokens held back from the prompt budget for the model's answer.
    pub reserved_response_tokens: usize,
    /// Seconds before an analysis call is abandoned.
    pub timeout_secs: u64,
    /// Color used when the model's JSON omits or garbles the triage color.
    pub default_color: String,
    /// Phrases appended to the built-in emergency list.
    pub extra_emergency_phrases: Vec<String>,
    /// Ask the model for clarification questions instead of a fixed set.
    pub dynamic_clarification: bool,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_context_tokens: 2048,
            reserved_response_tokens: 512,
            timeout_secs: 120,
            default_color: "BLUE".to_string(),
            extra_emergency_phrases: Vec::new(),
            dynamic_clarification: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of sessions kept before LRU eviction.
    pub max_sessions: usize,
    /// Idle seconds before a session expires. `None` disables expiry.
    pub ttl_secs: Option<u64>,
    /// Interval in seconds between expiry sweeps.
    pub cleanup_interval_secs: u64,
    /// Keep analyzed sessions around (answering "already analyzed") instead
    /// of evicting them once the result is delivered.
    pub retain_completed: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            ttl_secs: Some(3600),
            cleanup_interval_secs: 60,
            retain_completed: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rolling JSON logs. Disabled when unset.
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CuracoreConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());
        assert_eq!(config.llm().backend, Backend::Ollama);
        assert_eq!(config.llm().model, "gemma:2b");
        assert_eq!(config.corpus().collection, "medical_docs");
        assert_eq!(config.corpus().chunk_size, 1000);
        assert_eq!(config.corpus().chunk_overlap, 200);
        assert_eq!(config.corpus().batch_size, 5000);
        assert_eq!(config.retrieval().k, 3);
        assert_eq!(config.triage().default_color, "BLUE");
        assert_eq!(config.server().port, 8000);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_sections() {
        let toml = r#"
[llm]
backend = "openai"
model = "gpt-4o-mini"
base_url = "http://localhost:8080/v1"

[embedding]
provider = "mock"
dimensions = 8

[retrieval]
k = 5
max_distance = 1.2

[triage]
extra_emergency_phrases = ["not breathing"]
"#;
        let config = CuracoreConfig::from_toml(toml).unwrap();
        let llm = config.llm();
        assert_eq!(llm.backend, Backend::Openai);
        assert_eq!(llm.model, "gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 120);
        assert_eq!(config.embedding().provider, EmbeddingProvider::Mock);
        assert_eq!(config.embedding().effective_dimensions(), 8);
        assert_eq!(config.retrieval().k, 5);
        assert_eq!(config.retrieval().max_distance, Some(1.2));
        assert_eq!(config.triage().extra_emergency_phrases, vec!["not breathing"]);
        assert_eq!(config.triage().temperature, 0.1);
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = CuracoreConfig::from_toml(
            r#"
[llm]
model = "base-model"

[server]
port = 9000
"#,
        )
        .unwrap();
        let overlay = CuracoreConfig::from_toml(
            r#"
[llm]
model = "overlay-model"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.llm().model, "overlay-model");
        assert_eq!(base.server().port, 9000);
    }

    #[test]
    fn test_roundtrip_defaults() {
        let config = CuracoreConfig::with_defaults();
        let text = config.to_toml().unwrap();
        let parsed = CuracoreConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.corpus().collection, "medical_docs");
        assert_eq!(parsed.session().max_sessions, 10_000);
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let config = CuracoreConfig::from_toml(
            r#"
[corpus]
chunk_size = 200
chunk_overlap = 200
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "corpus.chunk_overlap"));
    }

    #[test]
    fn test_validate_rejects_unknown_color() {
        let config = CuracoreConfig::from_toml(
            r#"
[triage]
default_color = "purple"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = CuracoreConfig::from_toml(
            r#"
[triage]
default_color = "red"
"#,
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_collection() {
        let config = CuracoreConfig::from_toml(
            r#"
[corpus]
collection = "docs; DROP TABLE"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_dimensions_by_provider() {
        let mut embedding = EmbeddingConfig::default();
        assert_eq!(embedding.effective_dimensions(), 384);
        embedding.provider = EmbeddingProvider::OpenAi;
        assert_eq!(embedding.effective_dimensions(), 1536);
    }

    #[test]
    fn test_plaintext_key_detection() {
        let mut llm = LlmConfig::default();
        assert!(!llm.has_plaintext_api_key());
        llm.api_key = Some("sk-test".to_string());
        assert!(llm.has_plaintext_api_key());
        assert_eq!(llm.resolve_api_key().as_deref(), Some("sk-test"));
    }
}
