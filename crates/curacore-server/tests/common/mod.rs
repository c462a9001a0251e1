//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use curacore_config::RetrievalConfig;
use curacore_corpus::{CorpusIndex, IndexedChunk};
use curacore_llm::{Embedder, MockBackend, MockEmbedder, MockResponse};
use curacore_server::{AppState, Server, ServerConfig};
use curacore_session::{CacheConfig, SessionCache};
use curacore_triage::{
    ContextAssembler, DoctorSummarizer, GroundedAnswerer, ReasoningInvoker, Retriever, SafetyGate,
    Session, SessionManager, SessionStore, TriageEngine,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const REFERENCE: &[&str] = &[
    "Fever in adults is usually caused by viral infections.",
    "A sprained ankle should be rested and iced.",
    "Migraine headaches are often one-sided and throbbing.",
];

pub struct TestApp {
    pub state: AppState,
    pub backend: Arc<MockBackend>,
}

impl TestApp {
    /// An app over a small seeded corpus and a scripted model.
    pub async fn new(responses: Vec<MockResponse>) -> Self {
        Self::with_retain_completed(responses, true).await
    }

    /// Same, with the server's default of closing finished sessions when
    /// `retain` is false.
    pub async fn with_retain_completed(responses: Vec<MockResponse>, retain: bool) -> Self {
        let embedder = Arc::new(MockEmbedder::new(32));
        let index = CorpusIndex::open_in_memory("medical_docs", 32, embedder.name()).unwrap();
        let mut chunks = Vec::new();
        for (i, text) in REFERENCE.iter().enumerate() {
            chunks.push(IndexedChunk::new("guide.txt", i, *text, embedder.embed(text).await.unwrap()));
        }
        index.upsert(&chunks).unwrap();

        let retriever = Arc::new(
            Retriever::new(embedder, Arc::new(index), &RetrievalConfig::default()).unwrap(),
        );
        let backend = Arc::new(MockBackend::new(responses));
        let invoker = Arc::new(ReasoningInvoker::new(backend.clone(), "mock-model"));

        let engine = TriageEngine::new(Arc::clone(&retriever), Arc::clone(&invoker))
            .with_dynamic_clarification(false);
        let store: Arc<dyn SessionStore> =
            Arc::new(SessionCache::<Session>::new(CacheConfig::new()));
        let sessions = SessionManager::new(store, Arc::new(engine)).with_retain_completed(retain);
        let answerer = GroundedAnswerer::new(
            SafetyGate::default(),
            Arc::clone(&retriever),
            Arc::clone(&invoker),
            ContextAssembler::new(2048, 512),
        );

        let state = AppState::new(
            ServerConfig::default(),
            sessions,
            DoctorSummarizer::new(invoker),
            answerer,
            retriever,
        );
        Self { state, backend }
    }

    pub fn router(&self) -> axum::Router {
        Server::new(self.state.clone()).router()
    }

    /// Serve on an ephemeral port in the background.
    pub async fn spawn(&self) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(self.state.clone());
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });
        (addr, handle)
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
