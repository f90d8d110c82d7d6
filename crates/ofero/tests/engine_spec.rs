//! End-to-end extraction behavior over scripted collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ofero::cache::{MemoryOcrCache, OcrCache};
use ofero::engine::{CriterionEngine, EngineError, Outcome};
use ofero::hybrid::{ExtractError, HybridExtractor};
use ofero::locate::SearchSpec;
use ofero::ocr::{OcrError, VisionOcr};
use ofero::pdf::{PageImage, PageSource, PdfError};

/// Page source whose text layers are scripted per page. Renders are
/// stand-in images; the OCR doubles below never look at the pixels.
struct ScriptedPageSource {
    path: PathBuf,
    pages: Vec<String>,
}

impl ScriptedPageSource {
    fn new(pages: &[&str]) -> Self {
        Self {
            path: PathBuf::from("/tmp/scripted-proposal.pdf"),
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl PageSource for ScriptedPageSource {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn native_text(&self, page_index: usize) -> Result<String, PdfError> {
        self.pages
            .get(page_index)
            .cloned()
            .ok_or(PdfError::PageOutOfRange {
                page_index,
                page_count: self.pages.len(),
            })
    }

    fn render_page(&self, page_index: usize, _dpi: u32) -> Result<PageImage, PdfError> {
        Ok(PageImage {
            page_index,
            width: 1,
            height: 1,
            png_data: Vec::new(),
        })
    }
}

struct CountingOcr {
    calls: AtomicUsize,
    text: String,
}

impl CountingOcr {
    fn new(text: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            text: text.to_string(),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VisionOcr for CountingOcr {
    async fn transcribe(&self, _image: &PageImage) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    fn model_id(&self) -> &str {
        "fake-vision"
    }
}

struct FailingOcr;

#[async_trait::async_trait]
impl VisionOcr for FailingOcr {
    async fn transcribe(&self, image: &PageImage) -> Result<String, OcrError> {
        Err(OcrError::TranscriptionFailed {
            page_index: image.page_index,
            reason: "provider offline".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "failing-vision"
    }
}

const NATIVE_PAGES: [&str; 3] = [
    "Introduction and general company background information for the evaluation committee.",
    "Criterion 2\nWe use AES-256 encryption for all data at rest and in transit.",
    "Criterion 3\nBackups are replicated nightly to a secondary data center location.",
];

fn criterion_spec(number: &str) -> SearchSpec {
    SearchSpec {
        header_label: "Criterion".to_string(),
        auto_increment: true,
        question_number: number.to_string(),
    }
}

#[tokio::test]
async fn native_document_yields_answer_without_ocr() {
    let ocr = Arc::new(CountingOcr::new("should never be called"));
    let engine = CriterionEngine::new(
        Arc::new(ScriptedPageSource::new(&NATIVE_PAGES)),
        Arc::new(MemoryOcrCache::new()),
        Some(ocr.clone()),
        200,
    );

    let outcome = engine
        .extract_answer(&criterion_spec("2"), Some((0, 3)))
        .await
        .unwrap();

    match outcome {
        Outcome::Found(answer) => {
            assert_eq!(
                answer.paragraph_text,
                "We use AES-256 encryption for all data at rest and in transit."
            );
            assert_eq!(answer.source_page, 1);
        }
        Outcome::NotFound => panic!("expected the criterion to be found"),
    }
    assert_eq!(ocr.call_count(), 0, "native pages must never invoke OCR");
}

#[tokio::test]
async fn missing_criterion_is_not_found_rather_than_an_error() {
    let engine = CriterionEngine::new(
        Arc::new(ScriptedPageSource::new(&NATIVE_PAGES)),
        Arc::new(MemoryOcrCache::new()),
        None,
        200,
    );

    let outcome = engine
        .extract_answer(&criterion_spec("7"), None)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::NotFound));
}

const SCANNED_TRANSCRIPTION: &str =
    "Criterion 2\nOur incident response plan covers detection, escalation and full recovery.";

#[tokio::test]
async fn scanned_page_is_transcribed_once_and_reused_from_cache() {
    let cache: Arc<dyn OcrCache> = Arc::new(MemoryOcrCache::new());

    let first_ocr = Arc::new(CountingOcr::new(SCANNED_TRANSCRIPTION));
    let first = HybridExtractor::new(
        Arc::new(ScriptedPageSource::new(&[""])),
        cache.clone(),
        Some(first_ocr.clone()),
        200,
    );
    let first_page = first.text_for_page(0).await.unwrap();
    assert!(first_page.is_scanned);
    assert_eq!(first_page.raw_text, SCANNED_TRANSCRIPTION);
    assert_eq!(first_ocr.call_count(), 1);
    assert_eq!(cache.count().await.unwrap(), 1);

    // A later run over the same document must hit the cache only.
    let second_ocr = Arc::new(CountingOcr::new("a different transcription"));
    let second = HybridExtractor::new(
        Arc::new(ScriptedPageSource::new(&[""])),
        cache.clone(),
        Some(second_ocr.clone()),
        200,
    );
    let second_page = second.text_for_page(0).await.unwrap();
    assert_eq!(second_ocr.call_count(), 0);
    assert_eq!(second_page.raw_text, first_page.raw_text);
}

#[tokio::test]
async fn concurrent_misses_for_one_page_collapse_to_a_single_call() {
    let ocr = Arc::new(CountingOcr::new(SCANNED_TRANSCRIPTION));
    let extractor = HybridExtractor::new(
        Arc::new(ScriptedPageSource::new(&[""])),
        Arc::new(MemoryOcrCache::new()),
        Some(ocr.clone()),
        200,
    );

    let (a, b) = tokio::join!(extractor.text_for_page(0), extractor.text_for_page(0));
    assert_eq!(a.unwrap().raw_text, b.unwrap().raw_text);
    assert_eq!(ocr.call_count(), 1);
}

#[tokio::test]
async fn scanned_page_without_provider_fails_and_writes_nothing() {
    let cache: Arc<dyn OcrCache> = Arc::new(MemoryOcrCache::new());
    let extractor = HybridExtractor::new(
        Arc::new(ScriptedPageSource::new(&[""])),
        cache.clone(),
        None,
        200,
    );

    let err = extractor.text_for_page(0).await.unwrap_err();
    assert!(matches!(
        err,
        ExtractError::Ocr(OcrError::Unavailable { .. })
    ));
    assert_eq!(cache.count().await.unwrap(), 0);
}

#[tokio::test]
async fn engine_reports_page_context_when_a_page_fails() {
    let engine = CriterionEngine::new(
        Arc::new(ScriptedPageSource::new(&[NATIVE_PAGES[0], ""])),
        Arc::new(MemoryOcrCache::new()),
        Some(Arc::new(FailingOcr)),
        200,
    );

    let err = engine
        .extract_answer(&criterion_spec("2"), None)
        .await
        .unwrap_err();
    match err {
        EngineError::Page { page_number, .. } => assert_eq!(page_number, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_page_keeps_earlier_pages_in_the_range() {
    let extractor = HybridExtractor::new(
        Arc::new(ScriptedPageSource::new(&[NATIVE_PAGES[0], ""])),
        Arc::new(MemoryOcrCache::new()),
        Some(Arc::new(FailingOcr)),
        200,
    );

    let range = extractor.text_for_range(0, 2).await;
    assert_eq!(range.pages.len(), 1);
    assert_eq!(range.pages[0].page_number, 0);
    assert!(!range.pages[0].is_scanned);

    let failure = range.failed.expect("page 1 should have failed");
    assert_eq!(failure.page_number, 1);
    assert!(matches!(
        failure.error,
        ExtractError::Ocr(OcrError::TranscriptionFailed { page_index: 1, .. })
    ));
}

#[tokio::test]
async fn range_past_the_document_end_fails_with_page_context() {
    let extractor = HybridExtractor::new(
        Arc::new(ScriptedPageSource::new(&NATIVE_PAGES)),
        Arc::new(MemoryOcrCache::new()),
        None,
        200,
    );

    let range = extractor.text_for_range(0, 5).await;
    assert_eq!(range.pages.len(), 3);
    let failure = range.failed.expect("page 3 does not exist");
    assert_eq!(failure.page_number, 3);
    assert!(matches!(
        failure.error,
        ExtractError::Pdf(PdfError::PageOutOfRange { .. })
    ));
}

#[tokio::test]
async fn mixed_document_locates_answer_across_native_and_scanned_pages() {
    // Page 0 is native boilerplate, page 1 is a scan holding the
    // criterion, page 2 is native again with the next criterion.
    let ocr = Arc::new(CountingOcr::new(SCANNED_TRANSCRIPTION));
    let engine = CriterionEngine::new(
        Arc::new(ScriptedPageSource::new(&[
            NATIVE_PAGES[0],
            "",
            NATIVE_PAGES[2],
        ])),
        Arc::new(MemoryOcrCache::new()),
        Some(ocr.clone()),
        200,
    );

    let outcome = engine
        .extract_answer(&criterion_spec("2"), None)
        .await
        .unwrap();
    match outcome {
        Outcome::Found(answer) => {
            assert_eq!(
                answer.paragraph_text,
                "Our incident response plan covers detection, escalation and full recovery."
            );
            assert_eq!(answer.source_page, 1);
            assert_eq!(answer.confidence_note, "delimited by the next section header");
        }
        Outcome::NotFound => panic!("expected the criterion to be found"),
    }
    assert_eq!(ocr.call_count(), 1);
}
