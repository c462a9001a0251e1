//! Generation model and embedding clients for CuraCore.
//!
//! The triage core talks to two black boxes: a generation model mapping a
//! prompt to text, and an embedding function mapping text to a vector.
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │  LlmBackend trait        │   │  Embedder trait          │
//! │  - complete() -> text    │   │  - embed() -> Vec<f32>   │
//! └──────────────────────────┘   └──────────────────────────┘
//!      │        │       │            │        │        │
//!      ▼        ▼       ▼            ▼        ▼        ▼
//!   Ollama   OpenAI   Mock         Local   OpenAI    Mock
//! ```

pub mod backend;
pub mod client;
pub mod embeddings;
pub mod error;
pub mod ollama;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, MockBackend, MockResponse, SharedBackend, with_retry};
pub use client::{BackendSpec, build_backend};
pub use embeddings::{
    Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder,
    build_embedder, cosine_similarity,
};
pub use error::{LlmError, RateLimitInfo, Result};
pub use ollama::{OllamaBackend, OllamaConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};

#[cfg(feature = "local-embeddings")]
pub use embeddings::local::LocalEmbedder;
