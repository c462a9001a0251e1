//! Application state shared across handlers.

use std::sync::Arc;

use curacore_triage::{DoctorSummarizer, GroundedAnswerer, Retriever, SessionManager};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionManager>,
    pub summarizer: Arc<DoctorSummarizer>,
    pub answerer: Arc<GroundedAnswerer>,
    pub retriever: Arc<Retriever>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        sessions: SessionManager,
        summarizer: DoctorSummarizer,
        answerer: GroundedAnswerer,
        retriever: Arc<Retriever>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            summarizer: Arc::new(summarizer),
            answerer: Arc::new(answerer),
            retriever,
        }
    }
}
