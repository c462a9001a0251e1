//! Prompt text and fixed replies.
//!
//! [`TRIAGE_INSTRUCTIONS`] and [`crate::reasoning::parse_triage`] form one
//! contract: the instructions name the JSON keys the parser reads. Bump
//! [`PROTOCOL_VERSION`] whenever either side changes and re-run the recorded
//! model outputs in the reasoning tests.

use crate::session::{AnswerKey, Session, TriageStep};

/// Version of the triage instruction/parser contract.
pub const PROTOCOL_VERSION: &str = "mts-json/1";

pub const RISK_ASSESSMENT_PROMPT: &str = "I understand. To ensure safety, do you have any \
chronic conditions (Diabetes, BP, Heart issues) or allergies?";

pub const SEVERITY_CHECK_PROMPT: &str =
    "Noted. On a scale of 1-10, how severe is the pain or discomfort right now?";

pub const CLARIFICATION_PREFIX: &str = "Just a few more details: ";

/// Used when the model cannot generate follow-up questions.
pub const FALLBACK_CLARIFICATION: &str = "Just a few more details: \
1. When did this start, and did it come on suddenly or gradually? \
2. Where exactly do you feel it, and does it spread anywhere? \
3. What makes it better or worse?";

pub const ALREADY_ANALYZED: &str =
    "I have already provided the analysis. Please restart for a new consultation.";

pub const NO_INFORMATION: &str = "I don't have enough information.";

pub const SUMMARY_FAILED: &str = "Summary generation failed.";

/// Manchester Triage System instructions for the analysis step.
pub const TRIAGE_INSTRUCTIONS: &str = r#"You are an expert Triage Nurse AI. Analyze the patient data below and classify it using the Manchester Triage System (MTS).

The intake is complete: symptoms, history, severity and specifics have been collected. Do not ask further questions.

CRITERIA:
- RED (Immediate): Airway compromise, Unconscious, Shock.
- ORANGE (Very Urgent): Severe pain (7-10/10), High fever (>40C), Altered state.
- YELLOW (Urgent): Moderate pain (4-6/10), Vomiting, Infection signs.
- GREEN (Standard): Mild pain (1-3/10), Minor injury.
- BLUE (Non-Urgent): Chronic issues, cosmetic.

Use the REFERENCE CONTEXT when it is relevant. Ignore it when it is not.

OUTPUT JSON FORMAT ONLY:
{
  "triage_color": "RED" | "ORANGE" | "YELLOW" | "GREEN" | "BLUE",
  "reasoning": "Brief explanation of the decision",
  "specialist": "Recommended specialist (e.g., Cardiologist, Dermatologist)",
  "advice": "Immediate first-aid or home care advice"
}"#;

/// Patient summary placed last in the analysis prompt.
pub fn patient_summary(session: &Session) -> String {
    let answer = |key| session.answer(key).unwrap_or("").trim();
    format!(
        "Current step: {}\n\
         Patient Summary:\n\
         - Chief Complaint: {}\n\
         - History: {}\n\
         - Severity: {}\n\
         - Specifics: {}",
        TriageStep::Analysis,
        answer(AnswerKey::Symptoms),
        answer(AnswerKey::History),
        answer(AnswerKey::Severity),
        answer(AnswerKey::Details),
    )
}

/// Ask for follow-up questions about the reported symptom.
pub fn clarification_prompt(symptoms: &str) -> String {
    format!(
        "The user has reported the following symptom: \"{}\".\n\
         Generate 3 specific medical clarification questions based on the \"OLDCART\" method \
         (Onset, Location, Duration, Characteristics, Aggravating factors, Radiation, Timing).\n\
         Keep it conversational. Reply with the questions only.",
        symptoms.trim()
    )
}

/// Clinician-facing summary of a conversation.
pub fn summary_prompt(transcript: &str) -> String {
    format!(
        "You are a medical assistant. Summarize the following patient-AI conversation for a doctor.\n\n\
         FORMAT:\n\
         - **Symptoms:** [List main symptoms]\n\
         - **Duration:** [How long they have had it]\n\
         - **Potential Concerns:** [Key medical terms found]\n\
         - **Recommended Specialist:** [e.g. Cardiologist, Dermatologist]\n\n\
         CHAT HISTORY:\n{}",
        transcript
    )
}

/// Instructions for answering a free-form question from the corpus alone.
pub fn grounded_answer_instructions() -> String {
    format!(
        "You are CuraCore, an expert AI Medical Assistant.\n\
         Use the REFERENCE CONTEXT to answer the user's question.\n\n\
         RULES:\n\
         1. Only use the provided context. If the answer isn't there, say \"{}\"\n\
         2. Do NOT hallucinate treatments.\n\
         3. Be concise and professional.",
        NO_INFORMATION
    )
}
