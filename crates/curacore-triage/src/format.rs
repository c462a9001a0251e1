//! User-facing rendering of triage verdicts and fallbacks.

use crate::reasoning::TriageResult;

pub const DISCLAIMER: &str =
    "*Disclaimer: This is AI-generated advice. Call emergency services if condition worsens.*";

/// Shown when the model could not be reached or timed out.
pub const UNAVAILABLE_ADVISORY: &str = "⚠️ The triage service is currently unavailable, so \
I could not complete your assessment. Please see a doctor or visit an urgent care clinic in person.";

/// Shown when the model answered but its verdict could not be read.
pub const UNREADABLE_ADVISORY: &str = "⚠️ I could not produce a reliable triage assessment \
from the information provided. Please see a doctor in person for an evaluation.";

/// Severity glyph for a color label. Unknown labels get none.
pub fn glyph(color: &str) -> &'static str {
    match color.trim().to_ascii_uppercase().as_str() {
        "RED" => "🚨",
        "ORANGE" => "🟧",
        "YELLOW" => "🟨",
        "GREEN" => "✅",
        "BLUE" => "ℹ️",
        _ => "",
    }
}

/// Render a verdict with glyph, fields and disclaimer.
pub fn format_result(result: &TriageResult) -> String {
    let color = result.color.as_str();
    let heading = match glyph(color) {
        "" => format!("**TRIAGE LEVEL: {}**", color),
        g => format!("{} **TRIAGE LEVEL: {}**", g, color),
    };
    format!(
        "{}\n\n**Analysis:** {}\n**Recommended Specialist:** {}\n**Advice:** {}\n\n{}",
        heading, result.reasoning, result.specialist, result.advice, DISCLAIMER
    )
}

/// An advisory recommending in-person care, with the disclaimer.
pub fn format_advisory(advisory: &str) -> String {
    format!("{}\n\n{}", advisory, DISCLAIMER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::TriageColor;

    fn result(color: TriageColor) -> TriageResult {
        TriageResult {
            color,
            reasoning: "Moderate pain with fever".to_string(),
            specialist: "General Physician".to_string(),
            advice: "Rest and hydrate".to_string(),
        }
    }

    #[test]
    fn test_format_layout() {
        let text = format_result(&result(TriageColor::Yellow));
        assert_eq!(
            text,
            "🟨 **TRIAGE LEVEL: YELLOW**\n\n\
             **Analysis:** Moderate pain with fever\n\
             **Recommended Specialist:** General Physician\n\
             **Advice:** Rest and hydrate\n\n\
             *Disclaimer: This is AI-generated advice. Call emergency services if condition worsens.*"
        );
    }

    #[test]
    fn test_every_color_has_glyph_and_disclaimer() {
        for color in TriageColor::ALL {
            let text = format_result(&result(color));
            assert!(!glyph(color.as_str()).is_empty());
            assert!(text.starts_with(glyph(color.as_str())));
            assert!(text.ends_with(DISCLAIMER));
        }
    }

    #[test]
    fn test_unknown_color_has_no_glyph() {
        assert_eq!(glyph("PURPLE"), "");
        assert_eq!(glyph(""), "");
        assert_eq!(glyph(" red "), "🚨");
    }

    #[test]
    fn test_advisory_keeps_disclaimer() {
        let text = format_advisory(UNAVAILABLE_ADVISORY);
        assert!(text.contains("see a doctor"));
        assert!(text.ends_with(DISCLAIMER));
    }
}
