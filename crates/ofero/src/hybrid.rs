//! Hybrid per-page text resolution.
//!
//! Native text layers are used directly and never cached. Pages that
//! look scanned go through the OCR cache first and the vision provider
//! only on a miss, so any (document, page) pair is transcribed at most
//! once over the cache lifetime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, OcrCache, OcrCacheEntry};
use crate::hash::{PageHash, page_hash};
use crate::ocr::{OcrError, VisionOcr};
use crate::pdf::{PageSource, PdfError};
use crate::scan::{PageKind, classify, normalized_char_count};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("extraction task failed to complete: {0}")]
    TaskJoin(#[from] task::JoinError),
}

/// Text recovered for one page, with how it was obtained.
#[derive(Debug, Clone)]
pub struct PageTextResult {
    /// Zero-based page index.
    pub page_number: usize,
    pub raw_text: String,
    /// Non-whitespace character count of `raw_text`.
    pub char_count: usize,
    /// True when the text came from OCR (fresh or cached) rather than
    /// the native text layer.
    pub is_scanned: bool,
}

/// Why one page in a range could not be resolved.
#[derive(Debug)]
pub struct PageFailure {
    pub page_number: usize,
    pub error: ExtractError,
}

/// Outcome of a range extraction: every page resolved so far, in
/// ascending order, plus the failure (if any) that stopped the walk.
/// Pages extracted before a failure are not thrown away; transcriptions
/// already persisted stay persisted.
#[derive(Debug)]
pub struct RangeText {
    pub pages: Vec<PageTextResult>,
    pub failed: Option<PageFailure>,
}

/// Orchestrates [`PageSource`], the scan detector, [`OcrCache`] and
/// [`VisionOcr`] into a single per-page text lookup.
pub struct HybridExtractor {
    source: Arc<dyn PageSource>,
    cache: Arc<dyn OcrCache>,
    ocr: Option<Arc<dyn VisionOcr>>,
    render_dpi: u32,
    /// Per-hash locks collapsing concurrent cache misses for the same
    /// page into a single provider call.
    inflight: Mutex<HashMap<PageHash, Arc<Mutex<()>>>>,
}

impl HybridExtractor {
    /// `ocr` is `None` when no provider is configured; native pages
    /// still resolve, scanned pages fail with [`OcrError::Unavailable`].
    pub fn new(
        source: Arc<dyn PageSource>,
        cache: Arc<dyn OcrCache>,
        ocr: Option<Arc<dyn VisionOcr>>,
        render_dpi: u32,
    ) -> Self {
        Self {
            source,
            cache,
            ocr,
            render_dpi,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn source_path(&self) -> &Path {
        self.source.source_path()
    }

    pub fn page_count(&self) -> usize {
        self.source.page_count()
    }

    /// Resolve the text for one page: native layer if present, cached
    /// transcription next, one OCR call as the last resort.
    pub async fn text_for_page(&self, page_index: usize) -> Result<PageTextResult, ExtractError> {
        let native = self.native_text(page_index).await?;
        if classify(&native) == PageKind::Native {
            debug!(
                page = page_index,
                chars = normalized_char_count(&native),
                "native text layer present"
            );
            return Ok(PageTextResult {
                page_number: page_index,
                char_count: normalized_char_count(&native),
                raw_text: native,
                is_scanned: false,
            });
        }

        let hash = page_hash(self.source.source_path(), page_index);
        if let Some(entry) = self.cache.lookup(&hash).await? {
            debug!(page = page_index, model = %entry.model_used, "OCR cache hit");
            return Ok(cached_result(page_index, entry));
        }

        // Serialize concurrent misses for this page; whoever wins the
        // race transcribes, everyone else re-reads the cache.
        let slot = self.inflight_slot(&hash).await;
        let _guard = slot.lock().await;
        if let Some(entry) = self.cache.lookup(&hash).await? {
            debug!(page = page_index, "OCR cache filled while waiting");
            return Ok(cached_result(page_index, entry));
        }

        let Some(ocr) = self.ocr.as_ref() else {
            return Err(OcrError::unavailable().into());
        };

        let image = self.render_page(page_index).await?;
        info!(
            page = page_index,
            model = ocr.model_id(),
            "scanned page, transcribing via vision model"
        );
        let text = ocr.transcribe(&image).await?;

        let entry = OcrCacheEntry {
            page_hash: hash.clone(),
            source_path: self.source.source_path().to_path_buf(),
            page_number: page_index,
            extracted_text: text.clone(),
            model_used: ocr.model_id().to_string(),
            created_at: Utc::now(),
        };
        if !self.cache.store(&entry).await? {
            // Another process beat us to the row. First write wins, so
            // return what is actually persisted.
            warn!(page = page_index, "transcription already cached, keeping the existing entry");
            if let Some(existing) = self.cache.lookup(&hash).await? {
                return Ok(cached_result(page_index, existing));
            }
        }

        Ok(PageTextResult {
            page_number: page_index,
            char_count: normalized_char_count(&text),
            raw_text: text,
            is_scanned: true,
        })
    }

    /// Resolve pages `start..end` (zero-based, `end` exclusive) in
    /// ascending order. A page failure ends the walk but keeps what was
    /// already extracted.
    pub async fn text_for_range(&self, start: usize, end: usize) -> RangeText {
        let mut pages = Vec::new();
        for page_index in start..end {
            match self.text_for_page(page_index).await {
                Ok(page) => pages.push(page),
                Err(error) => {
                    warn!(page = page_index, %error, "page extraction failed, stopping range");
                    return RangeText {
                        pages,
                        failed: Some(PageFailure {
                            page_number: page_index,
                            error,
                        }),
                    };
                }
            }
        }
        RangeText { pages, failed: None }
    }

    async fn native_text(&self, page_index: usize) -> Result<String, ExtractError> {
        let source = Arc::clone(&self.source);
        Ok(task::spawn_blocking(move || source.native_text(page_index)).await??)
    }

    async fn render_page(
        &self,
        page_index: usize,
    ) -> Result<crate::pdf::PageImage, ExtractError> {
        let source = Arc::clone(&self.source);
        let dpi = self.render_dpi;
        Ok(task::spawn_blocking(move || source.render_page(page_index, dpi)).await??)
    }

    async fn inflight_slot(&self, hash: &PageHash) -> Arc<Mutex<()>> {
        let mut slots = self.inflight.lock().await;
        Arc::clone(slots.entry(hash.clone()).or_default())
    }
}

fn cached_result(page_index: usize, entry: OcrCacheEntry) -> PageTextResult {
    PageTextResult {
        page_number: page_index,
        char_count: normalized_char_count(&entry.extracted_text),
        raw_text: entry.extracted_text,
        is_scanned: true,
    }
}
