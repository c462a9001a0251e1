//! Recursive text chunker.
//!
//! Splits on the coarsest boundary present (paragraphs, then lines, then
//! sentence punctuation, then words) and falls back to a hard character cut
//! for runs with no boundary at all. Adjacent chunks share up to
//! `chunk_overlap` characters so content cut at a boundary still appears
//! whole in at least one chunk.
//!
//! All sizes are measured in characters, never bytes.

use std::collections::VecDeque;

use crate::error::{CorpusError, Result};

/// Boundaries tried in order, coarsest first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", " "];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl ChunkerConfig {
    /// Validated settings with the default separators.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CorpusError::InvalidChunker(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(CorpusError::InvalidChunker(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .collect();
        self
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Boundary-aware overlapping chunker.
#[derive(Debug, Clone, Default)]
pub struct RecursiveChunker {
    config: ChunkerConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// Chunks are trimmed; whitespace-only chunks are dropped.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &self.config.separators)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (pieces, finer): (Vec<&str>, &[String]) =
            match separators.iter().position(|s| text.contains(s.as_str())) {
                Some(i) => (
                    text.split_inclusive(separators[i].as_str()).collect(),
                    &separators[i + 1..],
                ),
                // No boundary left: cut between characters.
                None => (
                    text.char_indices()
                        .map(|(i, c)| &text[i..i + c.len_utf8()])
                        .collect(),
                    &[],
                ),
            };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.config.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            chunks.extend(self.split_recursive(piece, finer));
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying a tail of whole pieces
    /// of at most `chunk_overlap` characters into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > size && !current.is_empty() {
                chunks.push(current.iter().map(|(p, _)| *p).collect::<String>());
                while total > overlap || (total + len > size && total > 0) {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }
        if !current.is_empty() {
            chunks.push(current.iter().map(|(p, _)| *p).collect::<String>());
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
