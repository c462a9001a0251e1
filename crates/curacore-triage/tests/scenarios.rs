//! End-to-end triage conversations over an in-memory corpus.

use std::sync::Arc;

use curacore_config::RetrievalConfig;
use curacore_corpus::{ChunkerConfig, CorpusIndex, RecursiveChunker};
use curacore_llm::{Embedder, MockBackend, MockEmbedder, MockResponse};
use curacore_session::{CacheConfig, SessionCache};
use curacore_triage::{
    CorpusIngestor, DISCLAIMER, EMERGENCY_MESSAGE, ReasoningInvoker, Retriever, Session,
    SessionManager, SessionStore, TriageColor, TriageEngine, TriageStep, format_advisory,
};

const GUIDE: &str = "Fever with headache in adults is usually viral.\n\n\
    Diabetic patients with fever should monitor blood glucose closely.\n\n\
    Sudden severe headache needs urgent assessment.";

const VERDICT: &str = "```json\n{\"triage_color\": \"YELLOW\", \"reasoning\": \"Fever with moderate pain in a diabetic patient.\", \"specialist\": \"General Physician\", \"advice\": \"Hydrate and check glucose.\"}\n```";

struct Harness {
    backend: Arc<MockBackend>,
    manager: SessionManager,
    ingestor: CorpusIngestor,
}

async fn harness(responses: Vec<MockResponse>) -> Harness {
    let embedder = Arc::new(MockEmbedder::new(64));
    let index = Arc::new(
        CorpusIndex::open_in_memory("medical_docs", embedder.dimensions(), embedder.name())
            .unwrap(),
    );
    let chunker = RecursiveChunker::new(ChunkerConfig::new(80, 20).unwrap());
    let ingestor = CorpusIngestor::new(embedder.clone(), Arc::clone(&index), chunker, 2).unwrap();
    ingestor.ingest_text("guide.txt", GUIDE).await.unwrap();

    let retriever = Retriever::new(embedder, index, &RetrievalConfig::default()).unwrap();
    let backend = Arc::new(MockBackend::new(responses));
    let invoker = ReasoningInvoker::new(backend.clone(), "gemma:2b");
    let engine = TriageEngine::new(Arc::new(retriever), Arc::new(invoker));
    let store: Arc<dyn SessionStore> = Arc::new(SessionCache::<Session>::new(CacheConfig::new()));
    let manager = SessionManager::new(store, Arc::new(engine)).with_retain_completed(true);

    Harness {
        backend,
        manager,
        ingestor,
    }
}

#[tokio::test]
async fn fever_conversation_reaches_grounded_analysis() {
    let h = harness(vec![
        MockResponse::text("1. When did the fever start?\n2. Is the headache one-sided?"),
        MockResponse::text(VERDICT),
    ])
    .await;

    let r = h.manager.process("p1", "I have a fever and headache").await.unwrap();
    assert_eq!(r.step, TriageStep::RiskAssessment);
    assert!(r.response_text.contains("chronic conditions"));

    let r = h.manager.process("p1", "no allergies, diabetic").await.unwrap();
    assert_eq!(r.step, TriageStep::SeverityCheck);

    let r = h.manager.process("p1", "severity 6").await.unwrap();
    assert_eq!(r.step, TriageStep::Clarification);
    assert!(r.response_text.starts_with("Just a few more details: 1. When did the fever start?"));

    let r = h
        .manager
        .process("p1", "started yesterday, worse at night")
        .await
        .unwrap();
    assert_eq!(r.step, TriageStep::Analysis);
    assert!(
        TriageColor::ALL
            .iter()
            .any(|c| r.response_text.contains(&format!("TRIAGE LEVEL: {}", c)))
    );
    assert!(r.response_text.contains("TRIAGE LEVEL: YELLOW"));
    assert!(r.response_text.ends_with(DISCLAIMER));

    // The analysis prompt was grounded in the corpus.
    let prompt = &h.backend.requests()[1].messages[0].content;
    assert!(prompt.contains("REFERENCE CONTEXT:"));
    assert!(prompt.contains("Current step: ANALYSIS"));
    assert!(prompt.contains("- Chief Complaint: I have a fever and headache"));
}

#[tokio::test]
async fn chest_pain_terminates_at_any_step() {
    let openers = [
        "I have a fever and headache",
        "no allergies",
        "severity 4",
        "since this morning",
    ];
    for depth in 0..openers.len() {
        let h = harness(vec![MockResponse::text("questions?")]).await;
        let id = format!("p{}", depth);
        for text in &openers[..depth] {
            h.manager.process(&id, text).await.unwrap();
        }

        let r = h.manager.process(&id, "I have chest pain").await.unwrap();
        assert_eq!(r.response_text, EMERGENCY_MESSAGE);
        assert_eq!(r.step, TriageStep::Terminated);
    }
}

#[tokio::test]
async fn model_failure_during_analysis_gives_advisory() {
    let h = harness(vec![
        MockResponse::text("questions?"),
        MockResponse::unavailable(),
    ])
    .await;

    let mut last = None;
    for text in ["rash on arm", "none", "2", "two weeks"] {
        last = Some(h.manager.process("p1", text).await.unwrap());
    }
    let r = last.unwrap();
    assert_eq!(r.step, TriageStep::Analysis);
    assert!(r.response_text.starts_with("⚠️"));
    assert!(r.response_text.ends_with(DISCLAIMER));
    assert_ne!(r.response_text, format_advisory(""));
}

#[tokio::test]
async fn analysis_is_not_repeated() {
    let h = harness(vec![MockResponse::text("q?"), MockResponse::text(VERDICT)]).await;
    for text in ["cough", "asthma", "5", "three days"] {
        h.manager.process("p1", text).await.unwrap();
    }
    let calls = h.backend.request_count();

    for _ in 0..3 {
        let r = h.manager.process("p1", "are you there?").await.unwrap();
        assert_eq!(r.step, TriageStep::Analysis);
        assert!(r.response_text.contains("already provided the analysis"));
    }
    assert_eq!(h.backend.request_count(), calls);
}

#[tokio::test]
async fn reingesting_a_document_keeps_chunk_count() {
    let h = harness(vec![]).await;
    let before = h.ingestor.index().count().unwrap();
    let report = h.ingestor.ingest_text("guide.txt", GUIDE).await.unwrap();
    assert_eq!(report.chunks, before);
    assert_eq!(h.ingestor.index().count().unwrap(), before);
}

#[tokio::test]
async fn empty_corpus_still_triages() {
    let embedder = Arc::new(MockEmbedder::new(16));
    let index = Arc::new(CorpusIndex::open_in_memory("empty", 16, embedder.name()).unwrap());
    let retriever = Retriever::new(embedder, index, &RetrievalConfig::default()).unwrap();
    let backend = Arc::new(MockBackend::with_texts(["q?", VERDICT]));
    let engine = TriageEngine::new(
        Arc::new(retriever),
        Arc::new(ReasoningInvoker::new(backend.clone(), "m")),
    );

    let mut session = Session::new("s");
    let mut reply = None;
    for text in ["fever", "none", "3", "today"] {
        reply = Some(engine.process(&mut session, text).await);
    }
    assert!(reply.unwrap().response_text.contains("TRIAGE LEVEL: YELLOW"));
    assert!(!backend.requests()[1].messages[0].content.contains("REFERENCE CONTEXT:"));
}
