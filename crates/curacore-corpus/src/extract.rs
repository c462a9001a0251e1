//! Per-section text extraction from reference documents.
//!
//! PDFs are read page by page; plain text and markdown files are split on
//! form feeds. A section that cannot be read is recorded and skipped so one
//! damaged page does not cost the whole document.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CorpusError, Result};
use crate::types::source_name;

/// A section that yielded no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSection {
    /// 1-based page or section number.
    pub section: usize,
    pub reason: String,
}

/// Text pulled out of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub path: PathBuf,
    /// Document name used as chunk provenance.
    pub source: String,
    /// Readable sections in document order.
    pub sections: Vec<String>,
    pub skipped: Vec<SkippedSection>,
}

impl ExtractedDocument {
    /// All readable text, one section per line break.
    pub fn text(&self) -> String {
        self.sections.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.trim().is_empty())
    }
}

/// Whether [`extract_document`] knows how to read this file.
pub fn is_supported(path: &Path) -> bool {
    match extension(path).as_deref() {
        Some("txt" | "md") => true,
        Some("pdf") => cfg!(feature = "pdf"),
        _ => false,
    }
}

/// Extract the text of a document, section by section.
pub fn extract_document(path: &Path) -> Result<ExtractedDocument> {
    let (sections, skipped) = match extension(path).as_deref() {
        Some("txt" | "md") => extract_plain(path)?,
        #[cfg(feature = "pdf")]
        Some("pdf") => extract_pdf(path)?,
        _ => return Err(CorpusError::UnsupportedFormat(path.to_path_buf())),
    };

    for skip in &skipped {
        warn!(
            path = %path.display(),
            section = skip.section,
            reason = %skip.reason,
            "Skipping unreadable section"
        );
    }
    debug!(
        path = %path.display(),
        sections = sections.len(),
        skipped = skipped.len(),
        "Extracted document"
    );

    Ok(ExtractedDocument {
        path: path.to_path_buf(),
        source: source_name(path),
        sections,
        skipped,
    })
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

fn extract_plain(path: &Path) -> Result<(Vec<String>, Vec<SkippedSection>)> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let sections = text
        .split('\u{000C}')
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .collect();
    Ok((sections, Vec::new()))
}

#[cfg(feature = "pdf")]
fn extract_pdf(path: &Path) -> Result<(Vec<String>, Vec<SkippedSection>)> {
    let document = lopdf::Document::load(path).map_err(|e| CorpusError::Extraction {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut sections = Vec::new();
    let mut skipped = Vec::new();
    for page in document.get_pages().keys() {
        match document.extract_text(&[*page]) {
            Ok(text) if !text.trim().is_empty() => sections.push(text),
            Ok(_) => skipped.push(SkippedSection {
                section: *page as usize,
                reason: "no extractable text".to_string(),
            }),
            Err(e) => skipped.push(SkippedSection {
                section: *page as usize,
                reason: e.to_string(),
            }),
        }
    }
    Ok((sections, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_text_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Triage Guide.TXT");
        std::fs::write(&path, "Page one text\u{000C}   \u{000C}Page three text").unwrap();

        let doc = extract_document(&path).unwrap();
        assert_eq!(doc.source, "Triage Guide.TXT");
        assert_eq!(doc.sections, vec!["Page one text", "Page three text"]);
        assert!(doc.skipped.is_empty());
        assert!(!doc.is_empty());
        assert_eq!(doc.text(), "Page one text\nPage three text");
    }

    #[test]
    fn test_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        assert!(!is_supported(&path));
        let err = extract_document(&path).unwrap_err();
        assert!(matches!(err, CorpusError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = extract_document(Path::new("/nonexistent/notes.md")).unwrap_err();
        assert!(matches!(err, CorpusError::Io(_)));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn test_corrupt_pdf_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();

        assert!(is_supported(&path));
        let err = extract_document(&path).unwrap_err();
        assert!(matches!(err, CorpusError::Extraction { .. }));
    }
}
