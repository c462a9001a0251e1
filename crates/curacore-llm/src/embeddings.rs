//! Embedding functions for the reference corpus.
//!
//! The same embedder must be used at ingestion and at query time. Every
//! embedder reports its [`name`](Embedder::name) and
//! [`dimensions`](Embedder::dimensions) so the corpus index can refuse a
//! mismatch.
//!
//! # Implementations
//!
//! - [`MockEmbedder`]: deterministic hashed bag-of-words vectors, for tests
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//! - `LocalEmbedder`: all-MiniLM-L6-v2 through ONNX Runtime (`local-embeddings` feature)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{LlmError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Converts text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, preserving order.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Stable identifier of the embedding model, recorded alongside the corpus.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic embedder for tests and offline runs.
///
/// Each lowercase word is hashed into one of `dimensions` buckets and the
/// counts are normalized to unit length, so texts sharing vocabulary land
/// close together and identical texts produce identical vectors.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for MockEmbedder {
    /// 384 dimensions, same as all-MiniLM-L6-v2.
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = (djb2(&word.to_lowercase()) % self.dimensions as u64) as usize;
            embedding[bucket] += 1.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        } else {
            // Text without words still needs a valid unit vector.
            embedding[0] = 1.0;
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn djb2(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Expected output dimensions; requested from the API when set.
    pub dimensions: Option<usize>,
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// OpenAI-compatible embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
    name: String,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let dimensions = config.dimensions.unwrap_or(match config.model.as_str() {
            "text-embedding-3-large" => 3072,
            "nomic-embed-text" => 768,
            "all-minilm" => 384,
            _ => 1536,
        });
        let name = format!("openai:{}", config.model);

        Ok(Self {
            client,
            config,
            dimensions,
            name,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Backend("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
            dimensions: self.config.dimensions,
        };

        let mut builder = self.client.post(self.embeddings_url()).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth(body),
                429 => LlmError::rate_limit(body),
                _ => LlmError::Backend(format!("Embedding request failed: HTTP {} - {}", status, body)),
            });
        }

        let result: EmbeddingResponse = response.json().await?;
        let mut data = result.data;
        data.sort_by_key(|e| e.index);

        if data.len() != texts.len() {
            return Err(LlmError::Backend(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        if let Some(bad) = data.iter().find(|e| e.embedding.len() != self.dimensions) {
            return Err(LlmError::Backend(format!(
                "Embedding has {} dimensions, expected {}",
                bad.embedding.len(),
                self.dimensions
            )));
        }

        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Local Embedder (ONNX Runtime)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "local-embeddings")]
pub mod local {
    //! Sentence embeddings computed in-process with ONNX Runtime.

    use super::*;
    use ndarray::Array2;
    use ort::session::Session;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::value::TensorRef;
    use parking_lot::Mutex;
    use std::path::Path;
    use tokenizers::Tokenizer;

    /// Encodings per inference call.
    const INFERENCE_BATCH: usize = 32;

    fn ort_err(context: &str, e: impl std::fmt::Display) -> LlmError {
        LlmError::Config(format!("{}: {}", context, e))
    }

    /// Mean-pooled, L2-normalized sentence embeddings from a BERT-style model.
    pub struct LocalEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimensions: usize,
    }

    impl LocalEmbedder {
        /// Load `model.onnx` and `tokenizer.json`.
        pub fn load(
            model_path: impl AsRef<Path>,
            tokenizer_path: impl AsRef<Path>,
            dimensions: usize,
        ) -> Result<Self> {
            let session = Session::builder()
                .map_err(|e| ort_err("Failed to create ONNX session", e))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| ort_err("Failed to set optimization level", e))?
                .commit_from_file(model_path.as_ref())
                .map_err(|e| {
                    ort_err(
                        &format!("Failed to load ONNX model from {:?}", model_path.as_ref()),
                        e,
                    )
                })?;

            let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref()).map_err(|e| {
                ort_err(
                    &format!("Failed to load tokenizer from {:?}", tokenizer_path.as_ref()),
                    e,
                )
            })?;

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimensions,
            })
        }

        fn run_batch(&self, encodings: &[tokenizers::Encoding]) -> Result<Vec<Vec<f32>>> {
            let batch_size = encodings.len();
            let max_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0);

            let mut input_ids = Array2::<i64>::zeros((batch_size, max_len));
            let mut attention_mask = Array2::<i64>::zeros((batch_size, max_len));
            let mut token_type_ids = Array2::<i64>::zeros((batch_size, max_len));
            for (i, enc) in encodings.iter().enumerate() {
                for (j, ((&id, &mask), &ty)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .zip(enc.get_type_ids())
                    .enumerate()
                {
                    input_ids[[i, j]] = id as i64;
                    attention_mask[[i, j]] = mask as i64;
                    token_type_ids[[i, j]] = ty as i64;
                }
            }

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => TensorRef::from_array_view(input_ids.view()).map_err(|e| ort_err("Input error", e))?,
                    "attention_mask" => TensorRef::from_array_view(attention_mask.view()).map_err(|e| ort_err("Input error", e))?,
                    "token_type_ids" => TensorRef::from_array_view(token_type_ids.view()).map_err(|e| ort_err("Input error", e))?,
                ])
                .map_err(|e| LlmError::Backend(format!("ONNX inference failed: {}", e)))?;

            // (batch, seq_len, hidden)
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| LlmError::Backend(format!("Output extraction failed: {}", e)))?;
            if shape.len() != 3 {
                return Err(LlmError::Backend(format!(
                    "Unexpected output rank {}",
                    shape.len()
                )));
            }
            let seq_len = shape[1] as usize;
            let hidden = shape[2] as usize;

            let mut results = Vec::with_capacity(batch_size);
            for i in 0..batch_size {
                let mut pooled = vec![0.0f32; hidden];
                let mut count = 0.0f32;
                for j in 0..seq_len.min(max_len) {
                    if attention_mask[[i, j]] == 0 {
                        continue;
                    }
                    let offset = (i * seq_len + j) * hidden;
                    for (k, v) in data[offset..offset + hidden].iter().enumerate() {
                        pooled[k] += v;
                    }
                    count += 1.0;
                }
                if count > 0.0 {
                    pooled.iter_mut().for_each(|v| *v /= count);
                }
                let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 1e-9 {
                    pooled.iter_mut().for_each(|v| *v /= norm);
                }
                results.push(pooled);
            }

            Ok(results)
        }
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_batch(&[text])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| LlmError::Backend("No embedding returned".to_string()))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let encodings = texts
                .iter()
                .map(|text| {
                    self.tokenizer
                        .encode(*text, true)
                        .map_err(|e| LlmError::InvalidRequest(format!("Tokenization failed: {}", e)))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut all = Vec::with_capacity(texts.len());
            for chunk in encodings.chunks(INFERENCE_BATCH) {
                all.extend(self.run_batch(chunk)?);
            }
            Ok(all)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            "local:all-MiniLM-L6-v2"
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic description of the embedder to build.
///
/// The binary fills this from `[embedding]` so this crate stays free of a
/// config dependency.
#[derive(Debug, Clone)]
pub struct EmbedderSpec {
    /// "local", "openai", or "mock".
    pub provider: String,
    pub dimensions: usize,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: Option<PathBuf>,
}

/// Build a [`SharedEmbedder`] from a spec.
///
/// Falls back to [`MockEmbedder`] when the local provider is unavailable
/// (feature disabled or model files missing).
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    match spec.provider.as_str() {
        "openai" => {
            let mut config = OpenAiEmbedderConfig::new(spec.api_key.clone())
                .with_dimensions(spec.dimensions);
            if let Some(ref model) = spec.model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.base_url {
                config = config.with_base_url(base_url);
            }
            if config.api_key.is_none() && config.base_url.contains("api.openai.com") {
                return Err(LlmError::Config(
                    "OpenAI embedding provider requires an API key".to_string(),
                ));
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        #[cfg(feature = "local-embeddings")]
        "local" => {
            if let Some(ref dir) = spec.model_dir {
                let model_path = dir.join("model.onnx");
                let tokenizer_path = dir.join("tokenizer.json");
                if model_path.exists() && tokenizer_path.exists() {
                    let embedder =
                        local::LocalEmbedder::load(&model_path, &tokenizer_path, spec.dimensions)?;
                    return Ok(Arc::new(embedder));
                }
            }
            tracing::warn!(
                model_dir = ?spec.model_dir,
                "Local embedding model not found. Falling back to mock embedder."
            );
            Ok(Arc::new(MockEmbedder::new(spec.dimensions)))
        }
        #[cfg(not(feature = "local-embeddings"))]
        "local" => {
            tracing::warn!(
                "Local embeddings requested but the 'local-embeddings' feature is not enabled. \
                 Falling back to mock embedder."
            );
            Ok(Arc::new(MockEmbedder::new(spec.dimensions)))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(spec.dimensions))),
        other => Err(LlmError::Config(format!(
            "Unknown embedding provider '{}'. Valid: local, openai, mock",
            other
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity between two embeddings; 0.0 on length mismatch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(provider: &str) -> EmbedderSpec {
        EmbedderSpec {
            provider: provider.to_string(),
            dimensions: 16,
            model: None,
            base_url: None,
            api_key: None,
            model_dir: None,
        }
    }

    #[tokio::test]
    async fn test_mock_embedder_unit_length() {
        let embedder = MockEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.name(), "mock");

        let embedding = embedder.embed("hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::default();
        let e1 = embedder.embed("Fever and headache").await.unwrap();
        let e2 = embedder.embed("Fever and headache").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embedder_shared_vocabulary_is_closer() {
        let embedder = MockEmbedder::new(256);
        let query = embedder.embed("persistent fever").await.unwrap();
        let related = embedder
            .embed("A fever that is persistent may need review")
            .await
            .unwrap();
        let unrelated = embedder.embed("sprained ankle while running").await.unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_mock_embedder_empty_text() {
        let embedder = MockEmbedder::new(8);
        let embedding = embedder.embed("   ").await.unwrap();
        assert_eq!(embedding[0], 1.0);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let embedder = MockEmbedder::new(32);
        let batch = embedder.embed_batch(&["one", "two", "three"]).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], embedder.embed("two").await.unwrap());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_openai_embedder_dimensions() {
        let embedder = OpenAiEmbedder::new(
            OpenAiEmbedderConfig::new(None)
                .with_base_url("http://localhost:11434/v1")
                .with_model("nomic-embed-text"),
        )
        .unwrap();
        assert_eq!(embedder.dimensions(), 768);
        assert_eq!(embedder.name(), "openai:nomic-embed-text");
    }

    #[test]
    fn test_build_embedder_mock() {
        let embedder = build_embedder(&spec("mock")).unwrap();
        assert_eq!(embedder.dimensions(), 16);
        assert_eq!(embedder.name(), "mock");
    }

    #[test]
    fn test_build_embedder_local_falls_back_without_model() {
        let embedder = build_embedder(&spec("local")).unwrap();
        assert_eq!(embedder.name(), "mock");
        assert_eq!(embedder.dimensions(), 16);
    }

    #[test]
    fn test_build_embedder_openai_requires_key_for_hosted_api() {
        assert!(build_embedder(&spec("openai")).is_err());

        let mut local = spec("openai");
        local.base_url = Some("http://localhost:11434/v1".to_string());
        assert!(build_embedder(&local).is_ok());
    }

    #[test]
    fn test_build_embedder_unknown_provider() {
        assert!(matches!(
            build_embedder(&spec("word2vec")),
            Err(LlmError::Config(_))
        ));
    }
}
