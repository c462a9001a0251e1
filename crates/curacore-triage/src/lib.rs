//! Safety-gated clinical triage core for CuraCore.
//!
//! A patient message flows through the [`SafetyGate`] first; anything that
//! gets past it advances the [`Session`] state machine. Once the required
//! answers are collected the [`TriageEngine`] retrieves reference chunks,
//! assembles a budgeted prompt, asks the generation model for a Manchester
//! Triage System verdict and formats it for display.
//!
//! The [`SessionManager`] exposes this as a per-id session API, and
//! [`CorpusIngestor`] builds the reference corpus the retriever searches.

pub mod answer;
pub mod context;
pub mod engine;
pub mod error;
pub mod format;
pub mod ingest;
pub mod manager;
pub mod prompts;
pub mod reasoning;
pub mod retrieval;
pub mod safety;
pub mod session;
pub mod summary;

pub use answer::{GroundedAnswer, GroundedAnswerer};
pub use context::{AssembledPrompt, ContextAssembler, estimate_tokens};
pub use engine::{TriageEngine, TriageReply};
pub use error::{Result, TriageError};
pub use format::{DISCLAIMER, format_advisory, format_result, glyph};
pub use ingest::{CorpusIngestor, DirectoryReport, IngestProgress, IngestReport};
pub use manager::{SessionManager, SessionStore, cache_config};
pub use prompts::PROTOCOL_VERSION;
pub use reasoning::{ReasoningInvoker, TriageColor, TriageResult, parse_triage};
pub use retrieval::{RetrievedChunk, Retriever, check_embedding_space};
pub use safety::{DEFAULT_EMERGENCY_PHRASES, EMERGENCY_MESSAGE, SafetyGate};
pub use session::{AnswerKey, Session, Transition, TriageStep, Turn};
pub use summary::DoctorSummarizer;
