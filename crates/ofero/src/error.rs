//! Application-level error type shared by the CLI entry points.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::AppConfigError;
use crate::engine::EngineError;
use crate::hybrid::ExtractError;
use crate::locate::LocateError;
use crate::ocr::OcrError;
use crate::pdf::PdfError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] AppConfigError),

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid page range {from}..={to} for a {page_count}-page document")]
    InvalidPageRange {
        from: usize,
        to: usize,
        page_count: usize,
    },
}
