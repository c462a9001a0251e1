//! Prompt assembly for the reasoning step.
//!
//! Sections are laid out in a fixed order: protocol instructions, reference
//! chunks, conversation history, then the latest query. Instructions and the
//! latest query are never cut. When the prompt exceeds its token budget the
//! oldest history turns go first, then the lowest-ranked chunks.

use crate::session::Turn;

// ─────────────────────────────────────────────────────────────────────────────
// Token Estimation
// ─────────────────────────────────────────────────────────────────────────────

const CHARS_PER_TOKEN: usize = 4;

/// Rough token count (~4 bytes per token for English text).
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

const CONTEXT_HEADER: &str = "REFERENCE CONTEXT:";
const HISTORY_HEADER: &str = "CONVERSATION SO FAR:";
const QUERY_HEADER: &str = "LATEST:";
const CHUNK_SEPARATOR: &str = "\n---\n";
const SECTION_SEPARATOR: &str = "\n\n";

// ─────────────────────────────────────────────────────────────────────────────
// Assembler
// ─────────────────────────────────────────────────────────────────────────────

/// The assembled prompt and what had to be left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub text: String,
    pub estimated_tokens: usize,
    /// Oldest history turns dropped to fit the budget.
    pub dropped_turns: usize,
    /// Lowest-ranked chunks dropped to fit the budget.
    pub dropped_chunks: usize,
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    /// Token budget for the prompt itself.
    budget: usize,
}

impl ContextAssembler {
    /// Budget = context window minus the tokens reserved for the answer.
    pub fn new(max_context_tokens: usize, reserved_response_tokens: usize) -> Self {
        Self {
            budget: max_context_tokens.saturating_sub(reserved_response_tokens),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Build the prompt. `chunks` must be ordered most relevant first.
    pub fn assemble<S: AsRef<str>>(
        &self,
        instructions: &str,
        chunks: &[S],
        history: &[Turn],
        latest_query: &str,
    ) -> AssembledPrompt {
        let chunks: Vec<&str> = chunks
            .iter()
            .map(|c| c.as_ref().trim())
            .filter(|c| !c.is_empty())
            .collect();
        let turns: Vec<String> = history
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.text))
            .collect();

        let mut keep_chunks = chunks.len();
        let mut first_turn = 0;

        loop {
            let text = render(
                instructions,
                &chunks[..keep_chunks],
                &turns[first_turn..],
                latest_query,
            );
            let estimated_tokens = estimate_tokens(&text);
            let fits = estimated_tokens <= self.budget;

            if fits || (first_turn == turns.len() && keep_chunks == 0) {
                if !fits {
                    tracing::warn!(
                        estimated_tokens,
                        budget = self.budget,
                        "Instructions and query alone exceed the prompt budget"
                    );
                }
                return AssembledPrompt {
                    text,
                    estimated_tokens,
                    dropped_turns: first_turn,
                    dropped_chunks: chunks.len() - keep_chunks,
                };
            }

            if first_turn < turns.len() {
                first_turn += 1;
            } else {
                keep_chunks -= 1;
            }
        }
    }
}

fn render(instructions: &str, chunks: &[&str], turns: &[String], latest_query: &str) -> String {
    let mut sections = vec![instructions.trim().to_string()];
    if !chunks.is_empty() {
        sections.push(format!("{}\n{}", CONTEXT_HEADER, chunks.join(CHUNK_SEPARATOR)));
    }
    if !turns.is_empty() {
        sections.push(format!("{}\n{}", HISTORY_HEADER, turns.join("\n")));
    }
    sections.push(format!("{}\n{}", QUERY_HEADER, latest_query));
    sections.join(SECTION_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use curacore_llm::Role;

    fn turn(role: Role, text: &str) -> Turn {
        Turn {
            role,
            text: text.to_string(),
        }
    }

    fn history() -> Vec<Turn> {
        vec![
            turn(Role::User, "first message"),
            turn(Role::Assistant, "first reply"),
            turn(Role::User, "second message"),
            turn(Role::Assistant, "second reply"),
        ]
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_section_order() {
        let assembler = ContextAssembler::new(10_000, 0);
        let prompt = assembler.assemble("RULES", &["chunk one", "chunk two"], &history(), "QUERY");

        let text = &prompt.text;
        let rules = text.find("RULES").unwrap();
        let one = text.find("chunk one").unwrap();
        let two = text.find("chunk two").unwrap();
        let first = text.find("user: first message").unwrap();
        let second = text.find("assistant: second reply").unwrap();
        let query = text.find("QUERY").unwrap();
        assert!(rules < one && one < two && two < first && first < second && second < query);
        assert!(text.contains("chunk one\n---\nchunk two"));
        assert!(text.ends_with("LATEST:\nQUERY"));
        assert_eq!(prompt.dropped_turns, 0);
        assert_eq!(prompt.dropped_chunks, 0);
    }

    #[test]
    fn test_deterministic() {
        let assembler = ContextAssembler::new(10_000, 0);
        let a = assembler.assemble("R", &["c"], &history(), "Q");
        let b = assembler.assemble("R", &["c"], &history(), "Q");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_sections_omitted() {
        let assembler = ContextAssembler::new(10_000, 0);
        let prompt = assembler.assemble::<&str>("RULES", &[], &[], "QUERY");
        assert_eq!(prompt.text, "RULES\n\nLATEST:\nQUERY");
    }

    #[test]
    fn test_oldest_history_dropped_first() {
        let full = ContextAssembler::new(10_000, 0).assemble("RULES", &["chunk"], &history(), "QUERY");
        // Room for everything except roughly one turn.
        let tight = ContextAssembler::new(full.estimated_tokens - 3, 0);
        let prompt = tight.assemble("RULES", &["chunk"], &history(), "QUERY");

        assert!(prompt.dropped_turns >= 1);
        assert_eq!(prompt.dropped_chunks, 0);
        assert!(!prompt.text.contains("first message"));
        assert!(prompt.text.contains("second reply"));
        assert!(prompt.text.contains("chunk"));
        assert!(prompt.estimated_tokens <= tight.budget());
    }

    #[test]
    fn test_chunks_dropped_after_history_lowest_rank_first() {
        let instructions = "RULES";
        let filler = "filler ".repeat(40);
        let chunks = ["best chunk", filler.as_str()];
        let base = ContextAssembler::new(10_000, 0).assemble(instructions, &chunks[..1], &[], "QUERY");
        let assembler = ContextAssembler::new(base.estimated_tokens, 0);

        let prompt = assembler.assemble(instructions, &chunks, &history(), "QUERY");
        assert_eq!(prompt.dropped_turns, 4);
        assert_eq!(prompt.dropped_chunks, 1);
        assert!(prompt.text.contains("best chunk"));
        assert!(!prompt.text.contains("filler"));
    }

    #[test]
    fn test_instructions_and_query_never_cut() {
        let assembler = ContextAssembler::new(100, 95);
        let prompt = assembler.assemble("LONG RULES ".repeat(20).as_str(), &["c"], &history(), "QUERY");
        assert!(prompt.text.starts_with("LONG RULES"));
        assert!(prompt.text.ends_with("QUERY"));
        assert_eq!(prompt.dropped_turns, 4);
        assert_eq!(prompt.dropped_chunks, 1);
    }
}
