//! Clinician-facing conversation summaries.

use std::sync::Arc;

use tracing::warn;

use crate::prompts::{SUMMARY_FAILED, summary_prompt};
use crate::reasoning::ReasoningInvoker;
use crate::session::Session;

pub struct DoctorSummarizer {
    invoker: Arc<ReasoningInvoker>,
}

impl DoctorSummarizer {
    pub fn new(invoker: Arc<ReasoningInvoker>) -> Self {
        Self { invoker }
    }

    /// Summarize the conversation for a doctor (symptoms, duration,
    /// concerns, specialist). Never fails; returns a fixed notice instead.
    pub async fn summarize(&self, session: &Session) -> String {
        if session.history().is_empty() {
            return SUMMARY_FAILED.to_string();
        }

        match self.invoker.generate(&summary_prompt(&session.transcript())).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(session_id = session.id(), error = %e, "Summary generation failed");
                SUMMARY_FAILED.to_string()
            }
        }
    }
}
