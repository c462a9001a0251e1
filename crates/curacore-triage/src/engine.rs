//! The per-message triage control flow.
//!
//! ```text
//! message ─▶ SafetyGate ──hit──▶ TERMINATED + emergency message
//!               │
//!               ▼
//!          Session::advance ─▶ fixed prompt | clarification | analysis
//!                                                      │
//!                   Retriever ─▶ ContextAssembler ─▶ ReasoningInvoker ─▶ format
//! ```

use std::sync::Arc;

use curacore_config::TriageConfig;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::context::ContextAssembler;
use crate::error::TriageError;
use crate::format::{UNAVAILABLE_ADVISORY, UNREADABLE_ADVISORY, format_advisory, format_result};
use crate::prompts::{
    ALREADY_ANALYZED, CLARIFICATION_PREFIX, FALLBACK_CLARIFICATION, RISK_ASSESSMENT_PROMPT,
    SEVERITY_CHECK_PROMPT, TRIAGE_INSTRUCTIONS, clarification_prompt, patient_summary,
};
use crate::reasoning::ReasoningInvoker;
use crate::retrieval::Retriever;
use crate::safety::{EMERGENCY_MESSAGE, SafetyGate};
use crate::session::{AnswerKey, Session, Transition, TriageStep};

/// Reply to one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageReply {
    pub response_text: String,
    /// The session's step after this message.
    pub step: TriageStep,
}

/// Drives a [`Session`] one message at a time.
pub struct TriageEngine {
    gate: SafetyGate,
    retriever: Arc<Retriever>,
    invoker: Arc<ReasoningInvoker>,
    assembler: ContextAssembler,
    dynamic_clarification: bool,
}

impl TriageEngine {
    pub fn new(retriever: Arc<Retriever>, invoker: Arc<ReasoningInvoker>) -> Self {
        let defaults = TriageConfig::default();
        Self {
            gate: SafetyGate::default(),
            retriever,
            invoker,
            assembler: ContextAssembler::new(
                defaults.max_context_tokens,
                defaults.reserved_response_tokens,
            ),
            dynamic_clarification: defaults.dynamic_clarification,
        }
    }

    pub fn from_config(
        retriever: Arc<Retriever>,
        invoker: Arc<ReasoningInvoker>,
        config: &TriageConfig,
    ) -> Self {
        Self::new(retriever, invoker)
            .with_safety_gate(SafetyGate::with_extra(&config.extra_emergency_phrases))
            .with_assembler(ContextAssembler::new(
                config.max_context_tokens,
                config.reserved_response_tokens,
            ))
            .with_dynamic_clarification(config.dynamic_clarification)
    }

    pub fn with_safety_gate(mut self, gate: SafetyGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Ask model-generated follow-up questions (otherwise a fixed set).
    pub fn with_dynamic_clarification(mut self, enabled: bool) -> Self {
        self.dynamic_clarification = enabled;
        self
    }

    pub fn safety_gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Handle one user message. Always produces a reply.
    pub async fn process(&self, session: &mut Session, text: &str) -> TriageReply {
        session.record_user(text);

        let response_text = if let Some(phrase) = self.gate.matched(text) {
            warn!(
                session_id = session.id(),
                step = %session.step(),
                phrase,
                "Emergency phrase detected, terminating session"
            );
            session.terminate();
            EMERGENCY_MESSAGE.to_string()
        } else {
            match session.advance(text) {
                Transition::Advanced { from, to } => {
                    debug!(session_id = session.id(), %from, %to, "Step advanced");
                    self.prompt_for(session, to).await
                }
                Transition::AlreadyAnalyzed => ALREADY_ANALYZED.to_string(),
                Transition::AlreadyTerminated => EMERGENCY_MESSAGE.to_string(),
            }
        };

        session.record_assistant(&response_text);
        TriageReply {
            response_text,
            step: session.step(),
        }
    }

    async fn prompt_for(&self, session: &Session, step: TriageStep) -> String {
        match step {
            TriageStep::RiskAssessment => RISK_ASSESSMENT_PROMPT.to_string(),
            TriageStep::SeverityCheck => SEVERITY_CHECK_PROMPT.to_string(),
            TriageStep::Clarification => self.clarify(session).await,
            TriageStep::Analysis => self.analyze(session).await,
            TriageStep::SymptomCollection | TriageStep::Terminated => {
                // advance() never lands here
                EMERGENCY_MESSAGE.to_string()
            }
        }
    }

    async fn clarify(&self, session: &Session) -> String {
        if !self.dynamic_clarification {
            return FALLBACK_CLARIFICATION.to_string();
        }

        let symptoms = session.answer(AnswerKey::Symptoms).unwrap_or_default();
        match self.invoker.generate(&clarification_prompt(symptoms)).await {
            Ok(questions) => format!("{}{}", CLARIFICATION_PREFIX, questions),
            Err(e) => {
                warn!(
                    session_id = session.id(),
                    error = %e,
                    "Clarification generation failed, using fixed questions"
                );
                FALLBACK_CLARIFICATION.to_string()
            }
        }
    }

    async fn analyze(&self, session: &Session) -> String {
        let chunks = self
            .retriever
            .search_or_empty(&session.retrieval_query())
            .await;
        let chunk_texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();

        // The current message is already part of the patient summary.
        let history = session.history();
        let earlier = &history[..history.len().saturating_sub(1)];

        let prompt = self.assembler.assemble(
            TRIAGE_INSTRUCTIONS,
            &chunk_texts,
            earlier,
            &patient_summary(session),
        );
        debug!(
            session_id = session.id(),
            chunks = chunk_texts.len(),
            dropped_turns = prompt.dropped_turns,
            dropped_chunks = prompt.dropped_chunks,
            estimated_tokens = prompt.estimated_tokens,
            "Assembled analysis prompt"
        );

        match self.invoker.invoke(&prompt.text).await {
            Ok(result) => {
                info!(
                    session_id = session.id(),
                    color = %result.color,
                    grounded = !chunks.is_empty(),
                    "Triage analysis complete"
                );
                format_result(&result)
            }
            Err(TriageError::Parse { reason, raw }) => {
                warn!(
                    session_id = session.id(),
                    reason = %reason,
                    raw = %raw,
                    "Unreadable triage output"
                );
                format_advisory(UNREADABLE_ADVISORY)
            }
            Err(e) => {
                error!(session_id = session.id(), error = %e, "Triage analysis failed");
                format_advisory(UNAVAILABLE_ADVISORY)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curacore_llm::{LlmBackend, MockBackend, MockEmbedder, MockResponse};
    use crate::format::DISCLAIMER;

    const VERDICT: &str = r#"{"triage_color": "GREEN", "reasoning": "Mild", "specialist": "GP", "advice": "Rest"}"#;

    fn engine(backend: Arc<MockBackend>) -> TriageEngine {
        let retriever = Arc::new(Retriever::ungrounded(Arc::new(MockEmbedder::new(16))));
        let invoker = Arc::new(ReasoningInvoker::new(backend, "m"));
        TriageEngine::new(retriever, invoker)
    }

    async fn run(engine: &TriageEngine, session: &mut Session, messages: &[&str]) -> Vec<TriageReply> {
        let mut replies = Vec::new();
        for m in messages {
            replies.push(engine.process(session, m).await);
        }
        replies
    }

    #[tokio::test]
    async fn test_fixed_prompts() {
        let engine = engine(Arc::new(MockBackend::new(vec![])));
        let mut session = Session::new("s");

        let replies = run(&engine, &mut session, &["fever", "none"]).await;
        assert_eq!(replies[0].response_text, RISK_ASSESSMENT_PROMPT);
        assert_eq!(replies[0].step, TriageStep::RiskAssessment);
        assert_eq!(replies[1].response_text, SEVERITY_CHECK_PROMPT);
        assert_eq!(replies[1].step, TriageStep::SeverityCheck);
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn test_generated_clarification_is_prefixed() {
        let backend = Arc::new(MockBackend::with_text("1. When did it start?"));
        let engine = engine(backend.clone());
        let mut session = Session::new("s");

        let replies = run(&engine, &mut session, &["headache", "none", "6"]).await;
        assert_eq!(replies[2].response_text, "Just a few more details: 1. When did it start?");
        assert_eq!(replies[2].step, TriageStep::Clarification);
        assert!(backend.requests()[0].messages[0].content.contains("\"headache\""));
    }

    #[tokio::test]
    async fn test_clarification_falls_back_when_model_fails() {
        let engine = engine(Arc::new(MockBackend::unavailable()));
        let mut session = Session::new("s");
        let replies = run(&engine, &mut session, &["headache", "none", "6"]).await;
        assert_eq!(replies[2].response_text, FALLBACK_CLARIFICATION);
    }

    #[tokio::test]
    async fn test_static_clarification_skips_model() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let engine = engine(backend.clone()).with_dynamic_clarification(false);
        let mut session = Session::new("s");
        run(&engine, &mut session, &["a", "b", "c"]).await;
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_analysis_and_idempotence() {
        let backend = Arc::new(MockBackend::with_texts(["questions?", VERDICT]));
        let engine = engine(backend.clone());
        let mut session = Session::new("s");

        let replies = run(&engine, &mut session, &["fever", "none", "3", "since monday"]).await;
        let analysis = &replies[3];
        assert_eq!(analysis.step, TriageStep::Analysis);
        assert!(analysis.response_text.starts_with("✅ **TRIAGE LEVEL: GREEN**"));
        assert!(analysis.response_text.ends_with(DISCLAIMER));

        let again = engine.process(&mut session, "hello?").await;
        assert_eq!(again.response_text, ALREADY_ANALYZED);
        assert_eq!(again.step, TriageStep::Analysis);
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn test_analysis_prompt_contents() {
        let backend = Arc::new(MockBackend::with_texts(["q", VERDICT]));
        let engine = engine(backend.clone());
        let mut session = Session::new("s");
        run(&engine, &mut session, &["fever", "asthma", "7", "since yesterday"]).await;

        let prompt = &backend.requests()[1].messages[0].content;
        assert!(prompt.starts_with(TRIAGE_INSTRUCTIONS));
        assert!(prompt.contains("user: fever"));
        assert!(prompt.contains("- Specifics: since yesterday"));
        // The final message appears only in the summary.
        assert_eq!(prompt.matches("since yesterday").count(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_verdict_gives_advisory() {
        let backend = Arc::new(MockBackend::with_texts(["q", "I think it is fine."]));
        let engine = engine(backend);
        let mut session = Session::new("s");
        let replies = run(&engine, &mut session, &["a", "b", "c", "d"]).await;
        assert_eq!(replies[3].response_text, format_advisory(UNREADABLE_ADVISORY));
        assert_eq!(replies[3].step, TriageStep::Analysis);
    }

    #[tokio::test]
    async fn test_invoke_failure_gives_advisory() {
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::text("q"),
            MockResponse::unavailable(),
        ]));
        let engine = engine(backend);
        let mut session = Session::new("s");
        let replies = run(&engine, &mut session, &["a", "b", "c", "d"]).await;
        assert_eq!(replies[3].response_text, format_advisory(UNAVAILABLE_ADVISORY));
    }

    #[tokio::test]
    async fn test_emergency_at_every_step() {
        for steps_before in 0..=4 {
            let backend = Arc::new(MockBackend::with_texts(["q", VERDICT]));
            let engine = engine(backend.clone());
            let mut session = Session::new("s");
            run(&engine, &mut session, &["a", "b", "c", "d"][..steps_before]).await;
            let calls_before = backend.request_count();

            let reply = engine.process(&mut session, "Now I have CHEST PAIN").await;
            assert_eq!(reply.response_text, EMERGENCY_MESSAGE);
            assert_eq!(reply.step, TriageStep::Terminated);
            assert_eq!(backend.request_count(), calls_before);

            let after = engine.process(&mut session, "ok").await;
            assert_eq!(after.response_text, EMERGENCY_MESSAGE);
            assert_eq!(after.step, TriageStep::Terminated);
        }
    }

    #[tokio::test]
    async fn test_extra_emergency_phrases_from_config() {
        let backend: Arc<MockBackend> = Arc::new(MockBackend::new(vec![]));
        let config = TriageConfig {
            extra_emergency_phrases: vec!["not breathing".to_string()],
            ..TriageConfig::default()
        };
        let retriever = Arc::new(Retriever::ungrounded(Arc::new(MockEmbedder::new(16))));
        let invoker = Arc::new(ReasoningInvoker::new(backend.clone(), "m"));
        let engine = TriageEngine::from_config(retriever, invoker, &config);

        let mut session = Session::new("s");
        let reply = engine.process(&mut session, "baby is not breathing").await;
        assert_eq!(reply.step, TriageStep::Terminated);
        assert_eq!(backend.name(), "mock");
    }
}
