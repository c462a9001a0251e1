//! Free-form questions answered from the reference corpus only.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::context::ContextAssembler;
use crate::error::{Result, TriageError};
use crate::format::{UNAVAILABLE_ADVISORY, format_advisory};
use crate::prompts::{NO_INFORMATION, grounded_answer_instructions};
use crate::reasoning::ReasoningInvoker;
use crate::retrieval::{RetrievedChunk, Retriever};
use crate::safety::{EMERGENCY_MESSAGE, SafetyGate};

#[derive(Debug, Clone, Serialize)]
pub struct GroundedAnswer {
    pub reply: String,
    /// Chunks the reply was grounded on, most relevant first.
    pub sources: Vec<RetrievedChunk>,
}

impl GroundedAnswer {
    fn bare(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            sources: Vec::new(),
        }
    }
}

pub struct GroundedAnswerer {
    gate: SafetyGate,
    retriever: Arc<Retriever>,
    invoker: Arc<ReasoningInvoker>,
    assembler: ContextAssembler,
}

impl GroundedAnswerer {
    pub fn new(
        gate: SafetyGate,
        retriever: Arc<Retriever>,
        invoker: Arc<ReasoningInvoker>,
        assembler: ContextAssembler,
    ) -> Self {
        Self {
            gate,
            retriever,
            invoker,
            assembler,
        }
    }

    /// Answer `question`. Only a blank question is an error; every other
    /// failure becomes an advisory reply.
    pub async fn answer(&self, question: &str) -> Result<GroundedAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(TriageError::validation("question must not be empty"));
        }

        if let Some(phrase) = self.gate.matched(question) {
            warn!(phrase, "Emergency phrase in question");
            return Ok(GroundedAnswer::bare(EMERGENCY_MESSAGE));
        }

        let sources = self.retriever.search_or_empty(question).await;
        if sources.is_empty() {
            return Ok(GroundedAnswer::bare(NO_INFORMATION));
        }

        let texts: Vec<&str> = sources.iter().map(|c| c.text.as_str()).collect();
        let prompt = self
            .assembler
            .assemble(&grounded_answer_instructions(), &texts, &[], question);

        match self.invoker.generate(&prompt.text).await {
            Ok(reply) => {
                info!(chunks = sources.len(), "Answered from corpus");
                Ok(GroundedAnswer { reply, sources })
            }
            Err(e) => {
                error!(error = %e, "Grounded answer failed");
                Ok(GroundedAnswer::bare(format_advisory(UNAVAILABLE_ADVISORY)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curacore_config::RetrievalConfig;
    use curacore_corpus::{CorpusIndex, IndexedChunk};
    use curacore_llm::{Embedder, MockBackend, MockEmbedder};

    async fn answerer(backend: Arc<MockBackend>, docs: &[&str]) -> GroundedAnswerer {
        let embedder = Arc::new(MockEmbedder::new(32));
        let index = CorpusIndex::open_in_memory("docs", 32, embedder.name()).unwrap();
        let mut chunks = Vec::new();
        for (i, text) in docs.iter().enumerate() {
            let embedding = embedder.embed(text).await.unwrap();
            chunks.push(IndexedChunk::new("ref.txt", i, *text, embedding));
        }
        index.upsert(&chunks).unwrap();

        let retriever =
            Retriever::new(embedder, Arc::new(index), &RetrievalConfig::default()).unwrap();
        GroundedAnswerer::new(
            SafetyGate::default(),
            Arc::new(retriever),
            Arc::new(ReasoningInvoker::new(backend, "m")),
            ContextAssembler::new(2048, 512),
        )
    }

    #[tokio::test]
    async fn test_answer_is_grounded() {
        let backend = Arc::new(MockBackend::with_text("Drink fluids."));
        let answerer = answerer(backend.clone(), &["Dehydration is treated with oral fluids."]).await;

        let answer = answerer.answer("How is dehydration treated?").await.unwrap();
        assert_eq!(answer.reply, "Drink fluids.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source, "ref.txt");

        let prompt = &backend.requests()[0].messages[0].content;
        assert!(prompt.contains("REFERENCE CONTEXT:\nDehydration is treated with oral fluids."));
        assert!(prompt.ends_with("How is dehydration treated?"));
    }

    #[tokio::test]
    async fn test_empty_corpus_has_no_information() {
        let backend = Arc::new(MockBackend::with_text("unused"));
        let answerer = answerer(backend.clone(), &[]).await;
        let answer = answerer.answer("What is sepsis?").await.unwrap();
        assert_eq!(answer.reply, NO_INFORMATION);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_emergency_question_is_gated() {
        let backend = Arc::new(MockBackend::with_text("unused"));
        let answerer = answerer(backend.clone(), &["Angina causes chest pain."]).await;
        let answer = answerer.answer("what to do about chest pain").await.unwrap();
        assert_eq!(answer.reply, EMERGENCY_MESSAGE);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let answerer = answerer(Arc::new(MockBackend::new(vec![])), &[]).await;
        assert!(matches!(answerer.answer("   ").await, Err(TriageError::Validation(_))));
    }

    #[tokio::test]
    async fn test_model_failure_is_advisory() {
        let answerer = answerer(Arc::new(MockBackend::unavailable()), &["Some text."]).await;
        let answer = answerer.answer("question").await.unwrap();
        assert_eq!(answer.reply, format_advisory(UNAVAILABLE_ADVISORY));
        assert!(answer.sources.is_empty());
    }
}
