//! Scanned-page detection.
//!
//! Pdfium reports an empty or near-empty text layer for pages that are
//! raster scans. A page whose native text carries fewer than
//! [`NATIVE_TEXT_THRESHOLD`] non-whitespace characters is treated as
//! scanned and routed through OCR instead.

/// Minimum non-whitespace character count for a page to count as having
/// a usable native text layer.
pub const NATIVE_TEXT_THRESHOLD: usize = 50;

/// How the text for a page was, or should be, obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// The embedded text layer is usable as-is.
    Native,
    /// The page needs image rendering and OCR.
    Scanned,
}

/// Number of characters left after stripping all whitespace.
pub fn normalized_char_count(raw_text: &str) -> usize {
    raw_text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Classify a page from its raw native text layer.
pub fn classify(raw_text: &str) -> PageKind {
    if normalized_char_count(raw_text) < NATIVE_TEXT_THRESHOLD {
        PageKind::Scanned
    } else {
        PageKind::Native
    }
}
