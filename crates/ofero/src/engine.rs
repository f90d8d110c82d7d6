//! Engine facade wiring the collaborators for one document.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::cache::OcrCache;
use crate::hybrid::{ExtractError, HybridExtractor};
use crate::locate::{ExtractedAnswer, LocateError, SearchSpec, locate};
use crate::ocr::VisionOcr;
use crate::pdf::PageSource;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("page {page_number} of {path} could not be resolved: {source}")]
    Page {
        path: PathBuf,
        page_number: usize,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// Result of an extraction request. NotFound is an ordinary outcome,
/// not an error: the document simply does not contain the section.
#[derive(Debug)]
pub enum Outcome {
    Found(ExtractedAnswer),
    NotFound,
}

/// Facade over one document: hybrid page text plus section location.
pub struct CriterionEngine {
    extractor: HybridExtractor,
}

impl CriterionEngine {
    pub fn new(
        source: Arc<dyn PageSource>,
        cache: Arc<dyn OcrCache>,
        ocr: Option<Arc<dyn VisionOcr>>,
        render_dpi: u32,
    ) -> Self {
        Self {
            extractor: HybridExtractor::new(source, cache, ocr, render_dpi),
        }
    }

    pub fn page_count(&self) -> usize {
        self.extractor.page_count()
    }

    pub fn extractor(&self) -> &HybridExtractor {
        &self.extractor
    }

    /// Locate the answer for `spec` within `pages` (zero-based, end
    /// exclusive; `None` scans the whole document).
    ///
    /// A page that cannot be resolved fails the request: boundary
    /// detection over a gap would silently misattribute text. Pages
    /// transcribed before the failure remain cached, so a retry after
    /// fixing the cause pays only for the pages it never reached.
    pub async fn extract_answer(
        &self,
        spec: &SearchSpec,
        pages: Option<(usize, usize)>,
    ) -> Result<Outcome, EngineError> {
        let (start, end) = pages.unwrap_or((0, self.extractor.page_count()));
        debug!(
            start,
            end,
            label = %spec.header_label,
            number = %spec.question_number,
            "extracting answer"
        );

        let range = self.extractor.text_for_range(start, end).await;
        if let Some(failure) = range.failed {
            return Err(EngineError::Page {
                path: self.extractor.source_path().to_path_buf(),
                page_number: failure.page_number,
                source: failure.error,
            });
        }

        match locate(&range.pages, spec)? {
            Some(answer) => Ok(Outcome::Found(answer)),
            None => Ok(Outcome::NotFound),
        }
    }
}
