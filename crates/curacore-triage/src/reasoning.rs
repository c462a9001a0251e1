//! Calls the generation model and parses its triage verdict.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use curacore_config::{LlmConfig, TriageConfig};
use curacore_llm::{CompletionRequest, LlmError, SharedBackend};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, TriageError};

// ─────────────────────────────────────────────────────────────────────────────
// Triage Result
// ─────────────────────────────────────────────────────────────────────────────

/// Manchester Triage System urgency, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriageColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
}

impl TriageColor {
    pub const ALL: [TriageColor; 5] = [
        Self::Red,
        Self::Orange,
        Self::Yellow,
        Self::Green,
        Self::Blue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Orange => "ORANGE",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
            Self::Blue => "BLUE",
        }
    }
}

impl fmt::Display for TriageColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageColor {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TriageError::validation(format!("unknown triage color '{}'", s)))
    }
}

/// A fully populated triage verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageResult {
    pub color: TriageColor,
    pub reasoning: String,
    pub specialist: String,
    pub advice: String,
}

const DEFAULT_REASONING: &str = "No reasoning was provided.";
const DEFAULT_SPECIALIST: &str = "General Practitioner";
const DEFAULT_ADVICE: &str = "Please consult a healthcare professional.";

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a model reply into a [`TriageResult`].
///
/// Tolerates markdown fences and prose around the JSON object. Output with
/// no JSON object at all is a [`TriageError::Parse`]. A JSON object with a
/// missing or unknown color gets `default_color`; missing text fields get
/// neutral defaults. Every substitution is logged.
pub fn parse_triage(raw: &str, default_color: TriageColor) -> Result<TriageResult> {
    let object = parse_object(raw)?;

    let mut defaulted = Vec::new();
    let color = match object.get("triage_color").or_else(|| object.get("color")) {
        Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
            defaulted.push("triage_color");
            default_color
        }),
        _ => {
            defaulted.push("triage_color");
            default_color
        }
    };

    let mut text_field = |key: &'static str, default: &str| match object.get(key).and_then(value_text) {
        Some(text) => text,
        None => {
            defaulted.push(key);
            default.to_string()
        }
    };
    let reasoning = text_field("reasoning", DEFAULT_REASONING);
    let specialist = text_field("specialist", DEFAULT_SPECIALIST);
    let advice = text_field("advice", DEFAULT_ADVICE);

    if !defaulted.is_empty() {
        warn!(
            fields = ?defaulted,
            color = %color,
            raw = %raw,
            "Triage output incomplete, substituted defaults"
        );
    }

    Ok(TriageResult {
        color,
        reasoning,
        specialist,
        advice,
    })
}

fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(TriageError::parse("empty model output", raw));
    }

    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(_) => extract_json_object(cleaned)
            .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
            .ok_or_else(|| TriageError::parse("no JSON object in model output", raw))?,
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(TriageError::parse(
            format!("expected a JSON object, got {}", json_kind(&other)),
            raw,
        )),
    }
}

/// Remove a surrounding ```/```json fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The outermost `{ ... }` span of `text`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Null | Value::Object(_) => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reasoning Invoker
// ─────────────────────────────────────────────────────────────────────────────

/// Sends prompts to the generation model with low temperature, a bounded
/// context window and a hard timeout. Never retries on its own.
pub struct ReasoningInvoker {
    backend: SharedBackend,
    model: String,
    temperature: f32,
    max_context: usize,
    max_tokens: u32,
    timeout: Duration,
    default_color: TriageColor,
}

impl ReasoningInvoker {
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        let defaults = TriageConfig::default();
        Self {
            backend,
            model: model.into(),
            temperature: defaults.temperature,
            max_context: defaults.max_context_tokens,
            max_tokens: defaults.reserved_response_tokens as u32,
            timeout: Duration::from_secs(defaults.timeout_secs),
            default_color: TriageColor::Blue,
        }
    }

    pub fn from_config(backend: SharedBackend, llm: &LlmConfig, triage: &TriageConfig) -> Result<Self> {
        Ok(Self::new(backend, llm.model.clone())
            .with_temperature(triage.temperature)
            .with_context_window(triage.max_context_tokens, triage.reserved_response_tokens)
            .with_timeout(Duration::from_secs(triage.timeout_secs))
            .with_default_color(triage.default_color.parse()?))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context_window(mut self, max_context: usize, reserved_response_tokens: usize) -> Self {
        self.max_context = max_context;
        self.max_tokens = u32::try_from(reserved_response_tokens).unwrap_or(u32::MAX);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_default_color(mut self, color: TriageColor) -> Self {
        self.default_color = color;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn default_color(&self) -> TriageColor {
        self.default_color
    }

    /// One completion, bounded by the timeout. Empty output is an error.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest::prompt(&self.model, prompt, self.max_tokens)
            .with_temperature(self.temperature)
            .with_max_context(self.max_context);

        let response = tokio::time::timeout(self.timeout, self.backend.complete(request))
            .await
            .map_err(|_| {
                LlmError::Timeout(format!(
                    "{} did not answer within {}s",
                    self.backend.name(),
                    self.timeout.as_secs()
                ))
            })??;

        debug!(
            backend = self.backend.name(),
            output_tokens = response.usage.output_tokens,
            "Model responded"
        );

        let text = response.text().trim();
        if text.is_empty() {
            return Err(TriageError::parse("empty model output", ""));
        }
        Ok(text.to_string())
    }

    /// Run the analysis prompt and parse the verdict.
    pub async fn invoke(&self, prompt: &str) -> Result<TriageResult> {
        let raw = self.generate(prompt).await?;
        parse_triage(&raw, self.default_color)
    }
}
