//! Per-conversation triage state.
//!
//! A [`Session`] walks a fixed linear sequence of steps, one per user
//! message. The only exception is the emergency jump to
//! [`TriageStep::Terminated`], which is allowed from any step.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use curacore_llm::Role;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriageStep {
    SymptomCollection,
    RiskAssessment,
    SeverityCheck,
    Clarification,
    Analysis,
    Terminated,
}

impl TriageStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymptomCollection => "SYMPTOM_COLLECTION",
            Self::RiskAssessment => "RISK_ASSESSMENT",
            Self::SeverityCheck => "SEVERITY_CHECK",
            Self::Clarification => "CLARIFICATION",
            Self::Analysis => "ANALYSIS",
            Self::Terminated => "TERMINATED",
        }
    }

    /// The step reached by answering this one. `None` for terminal steps.
    pub fn next(&self) -> Option<TriageStep> {
        match self {
            Self::SymptomCollection => Some(Self::RiskAssessment),
            Self::RiskAssessment => Some(Self::SeverityCheck),
            Self::SeverityCheck => Some(Self::Clarification),
            Self::Clarification => Some(Self::Analysis),
            Self::Analysis | Self::Terminated => None,
        }
    }

    /// Where the answer given at this step is stored.
    pub fn answer_key(&self) -> Option<AnswerKey> {
        match self {
            Self::SymptomCollection => Some(AnswerKey::Symptoms),
            Self::RiskAssessment => Some(AnswerKey::History),
            Self::SeverityCheck => Some(AnswerKey::Severity),
            Self::Clarification => Some(AnswerKey::Details),
            Self::Analysis | Self::Terminated => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Analysis | Self::Terminated)
    }
}

impl fmt::Display for TriageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured answers, ordered as they are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKey {
    Symptoms,
    History,
    Severity,
    Details,
}

impl AnswerKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symptoms => "symptoms",
            Self::History => "history",
            Self::Severity => "severity",
            Self::Details => "details",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// One message of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Result of feeding one message to [`Session::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The answer was stored and the session moved one step forward.
    Advanced { from: TriageStep, to: TriageStep },
    /// The session already produced its analysis.
    AlreadyAnalyzed,
    /// The session was closed by the emergency gate.
    AlreadyTerminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    step: TriageStep,
    answers: BTreeMap<AnswerKey, String>,
    history: Vec<Turn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            step: TriageStep::SymptomCollection,
            answers: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step(&self) -> TriageStep {
        self.step
    }

    pub fn answers(&self) -> &BTreeMap<AnswerKey, String> {
        &self.answers
    }

    pub fn answer(&self, key: AnswerKey) -> Option<&str> {
        self.answers.get(&key).map(String::as_str)
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Store `text` verbatim as the answer to the current step and move on.
    ///
    /// Any text is accepted, empty or not. Terminal sessions are left
    /// untouched.
    pub fn advance(&mut self, text: &str) -> Transition {
        let from = self.step;
        let (Some(key), Some(to)) = (from.answer_key(), from.next()) else {
            return match from {
                TriageStep::Terminated => Transition::AlreadyTerminated,
                _ => Transition::AlreadyAnalyzed,
            };
        };

        self.answers.insert(key, text.to_string());
        self.step = to;
        self.touch();
        Transition::Advanced { from, to }
    }

    /// Emergency exit, allowed from any step.
    pub fn terminate(&mut self) {
        self.step = TriageStep::Terminated;
        self.touch();
    }

    pub fn record_user(&mut self, text: &str) {
        self.push_turn(Role::User, text);
    }

    pub fn record_assistant(&mut self, text: &str) {
        self.push_turn(Role::Assistant, text);
    }

    fn push_turn(&mut self, role: Role, text: &str) {
        self.history.push(Turn {
            role,
            text: text.to_string(),
        });
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The collected answers joined in step order, used as the retrieval query.
    pub fn retrieval_query(&self) -> String {
        self.answers
            .values()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(". ")
    }

    /// Role-tagged transcript of the conversation.
    pub fn transcript(&self) -> String {
        self.history
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
