//! Emergency phrase detection.
//!
//! A cheap keyword screen run before anything else on every turn. It never
//! calls a model and cannot fail.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use tracing::warn;

/// Phrases that always end the conversation with an escalation message.
pub const DEFAULT_EMERGENCY_PHRASES: &[&str] = &[
    "chest pain",
    "heart attack",
    "unconscious",
    "stroke",
    "bleeding heavily",
];

pub const EMERGENCY_MESSAGE: &str = "🚨 **CRITICAL WARNING** 🚨\n\
Your description suggests a medical emergency.\n\n\
**ACTION:** Please call an Ambulance immediately. Do not rely on this chat.";

/// Case-insensitive emergency phrase matcher.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    phrases: Vec<String>,
    automaton: Option<AhoCorasick>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(DEFAULT_EMERGENCY_PHRASES.iter().copied())
    }
}

impl SafetyGate {
    /// Gate over exactly `phrases`.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = phrases
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();

        let automaton = match AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&normalized)
        {
            Ok(automaton) => Some(automaton),
            Err(e) => {
                // Substring scan below still covers every phrase.
                warn!(error = %e, "Failed to build emergency phrase automaton");
                None
            }
        };

        Self {
            phrases: normalized,
            automaton,
        }
    }

    /// Built-in phrases plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra: Vec<String> = extra.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::new(
            DEFAULT_EMERGENCY_PHRASES
                .iter()
                .map(|s| s.to_string())
                .chain(extra),
        )
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Whether `text` contains an emergency phrase.
    pub fn check(&self, text: &str) -> bool {
        self.matched(text).is_some()
    }

    /// The first emergency phrase found in `text`.
    pub fn matched(&self, text: &str) -> Option<&str> {
        let text = normalize(text);
        if text.is_empty() {
            return None;
        }
        match &self.automaton {
            Some(automaton) => automaton
                .find(&text)
                .and_then(|m| self.phrases.get(m.pattern().as_usize()))
                .map(String::as_str),
            None => self
                .phrases
                .iter()
                .find(|p| text.contains(p.as_str()))
                .map(String::as_str),
        }
    }
}

/// Lower-case and collapse whitespace runs so "Chest\n  PAIN" still matches.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
