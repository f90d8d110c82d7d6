//! Locating a criterion's answer section inside extracted page text.
//!
//! Tender proposals carry no machine-readable structure, so section
//! boundaries are a documented approximation: the answer starts after
//! the matched header and ends at the next header of the same family,
//! the next sequential number as a bare heading, or the end of the
//! scanned range.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::hybrid::PageTextResult;

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("invalid header pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Per-question search configuration supplied by the caller.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    /// Configured header label, e.g. `"Criterion"` or `"Kriterium"`.
    pub header_label: String,
    /// When true the question number participates in matching, in both
    /// observed orderings ("Criterion 2" and "2. Criterion").
    pub auto_increment: bool,
    pub question_number: String,
}

/// Byte offsets of a located section within concatenated page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub start: usize,
    pub end: usize,
    /// False when the section ran to the end of the range instead of
    /// being delimited by a following header.
    pub bounded_by_header: bool,
}

/// A located answer paragraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedAnswer {
    pub paragraph_text: String,
    /// Zero-based page the paragraph starts on.
    pub source_page: usize,
    pub confidence_note: String,
}

fn effective_number(spec: &SearchSpec) -> Option<String> {
    if !spec.auto_increment {
        return None;
    }
    let number = spec.question_number.trim();
    if number.is_empty() {
        None
    } else {
        Some(regex::escape(number))
    }
}

fn header_pattern(spec: &SearchSpec) -> Result<Regex, regex::Error> {
    let label = regex::escape(spec.header_label.trim());
    match effective_number(spec) {
        // Both orderings occur in the wild: "Criterion 2" and
        // "2. Criterion".
        Some(number) => Regex::new(&format!(
            r"(?i){label}\s*[:.\-]?\s*{number}\b|\b{number}\s*[.):\-]\s*{label}"
        )),
        None => Regex::new(&format!(r"(?i){label}")),
    }
}

/// A boundary is any header of the same family: the label with any
/// number in either ordering, or the next sequential number as a bare
/// heading at the start of a line.
fn boundary_pattern(spec: &SearchSpec) -> Result<Regex, regex::Error> {
    let label = regex::escape(spec.header_label.trim());
    match effective_number(spec) {
        Some(_) => {
            let mut alternatives = vec![
                format!(r"{label}\s*[:.\-]?\s*\d+\b"),
                format!(r"\b\d+\s*[.):\-]\s*{label}"),
            ];
            if let Some(next) = next_question_number(&spec.question_number) {
                alternatives.push(format!(r"^\s*{next}\s*[.)]\s+\S"));
            }
            Regex::new(&format!("(?im){}", alternatives.join("|")))
        }
        None => Regex::new(&format!(r"(?i){label}")),
    }
}

fn next_question_number(number: &str) -> Option<u64> {
    number.trim().parse::<u64>().ok().map(|n| n + 1)
}

/// Pure boundary search over already-concatenated text. `None` means
/// the header was not found, an ordinary outcome rather than an error.
pub fn section_bounds(text: &str, spec: &SearchSpec) -> Result<Option<SectionSpan>, LocateError> {
    let header = header_pattern(spec)?;
    let Some(header_match) = header.find(text) else {
        return Ok(None);
    };
    let start = header_match.end();

    let boundary = boundary_pattern(spec)?;
    let end = boundary.find(&text[start..]).map(|m| start + m.start());

    Ok(Some(SectionSpan {
        start,
        end: end.unwrap_or(text.len()),
        bounded_by_header: end.is_some(),
    }))
}

/// Locate the answer for `spec` within extracted pages. Pages must be
/// in ascending order, as produced by range extraction.
pub fn locate(
    pages: &[PageTextResult],
    spec: &SearchSpec,
) -> Result<Option<ExtractedAnswer>, LocateError> {
    if pages.is_empty() {
        return Ok(None);
    }

    // Concatenate in page order, remembering where each page begins so
    // the answer can be attributed to its source page.
    let mut text = String::new();
    let mut page_starts = Vec::with_capacity(pages.len());
    for page in pages {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        page_starts.push((text.len(), page.page_number));
        text.push_str(&page.raw_text);
    }

    let Some(span) = section_bounds(&text, spec)? else {
        return Ok(None);
    };

    let paragraph = text[span.start..span.end].trim();
    if paragraph.is_empty() {
        // A header immediately followed by the next header has no
        // answer to report.
        return Ok(None);
    }

    let source_page = page_starts
        .iter()
        .rev()
        .find(|(offset, _)| *offset <= span.start)
        .map(|(_, page)| *page)
        .unwrap_or(pages[0].page_number);

    let confidence_note = if span.bounded_by_header {
        "delimited by the next section header"
    } else {
        "ran to the end of the scanned range"
    };

    Ok(Some(ExtractedAnswer {
        paragraph_text: paragraph.to_string(),
        source_page,
        confidence_note: confidence_note.to_string(),
    }))
}
