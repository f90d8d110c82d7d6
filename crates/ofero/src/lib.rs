//! Criterion extraction and OCR-caching engine for tender proposals.
//!
//! Given a proposal PDF, a question's search configuration, and a page
//! range, the engine locates the section of text that answers the
//! question. Pages without a usable native text layer fall back to a
//! vision model, and every transcription is cached by content identity
//! so a page is transcribed at most once over the cache lifetime.

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod hybrid;
pub mod locate;
pub mod ocr;
pub mod pdf;
pub mod scan;

pub use cache::{CacheError, MemoryOcrCache, OcrCache, OcrCacheEntry, SqliteOcrCache};
pub use engine::{CriterionEngine, EngineError, Outcome};
pub use hash::{PageHash, page_hash};
pub use hybrid::{ExtractError, HybridExtractor, PageFailure, PageTextResult, RangeText};
pub use locate::{
    ExtractedAnswer, LocateError, SearchSpec, SectionSpan, locate, section_bounds,
};
pub use ocr::{ChatVisionOcr, ChatVisionOcrConfig, OcrError, VisionOcr};
pub use pdf::{PageImage, PageSource, PdfError, PdfiumPageSource};
pub use scan::{NATIVE_TEXT_THRESHOLD, PageKind, classify, normalized_char_count};

/// One-based page number for human-facing output. Everything internal
/// (hashing, caching, extraction) is zero-based.
pub fn display_page(page_index: usize) -> usize {
    page_index + 1
}
