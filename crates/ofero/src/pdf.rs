//! PDF access: per-page native text and page-to-image rendering.

use std::env;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use pdfium_render::prelude::*;
use thiserror::Error;

/// Resolution used when rendering a page for OCR.
pub const DEFAULT_RENDER_DPI: u32 = 200;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to load the Pdfium library: {0}")]
    Library(#[source] PdfiumError),

    #[error("failed to load PDF document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: PdfiumError,
    },

    #[error("page {page_index} out of range (document has {page_count} pages)")]
    PageOutOfRange { page_index: usize, page_count: usize },

    #[error("failed to extract text from page {page_index}: {source}")]
    PageText {
        page_index: usize,
        #[source]
        source: PdfiumError,
    },

    #[error("failed to render page {page_index}: {source}")]
    PageRender {
        page_index: usize,
        #[source]
        source: PdfiumError,
    },

    #[error("failed to encode page {page_index} as PNG: {source}")]
    Encode {
        page_index: usize,
        #[source]
        source: image::ImageError,
    },
}

/// In-memory rendering of a single PDF page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}

/// Per-page access to one PDF document.
///
/// The extractor depends on this trait rather than on Pdfium directly,
/// so tests can script page text and renders without a native library.
pub trait PageSource: Send + Sync {
    /// Identity of the underlying file, used for cache keys.
    fn source_path(&self) -> &Path;

    fn page_count(&self) -> usize;

    /// Embedded text layer for one page, without rendering or OCR.
    fn native_text(&self, page_index: usize) -> Result<String, PdfError>;

    /// Render one page to a PNG image at the given resolution.
    fn render_page(&self, page_index: usize, dpi: u32) -> Result<PageImage, PdfError>;
}

/// Production [`PageSource`] backed by Pdfium.
///
/// Pdfium bindings are not thread-safe, so the handle keeps only the
/// path and page count and re-binds the library per call. Requests in
/// this system touch a handful of pages each and the reload cost is
/// negligible next to an OCR round trip.
pub struct PdfiumPageSource {
    path: PathBuf,
    page_count: usize,
}

impl PdfiumPageSource {
    /// Open a document, verifying it loads and capturing its page count.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PdfError> {
        let path = path.as_ref().to_path_buf();
        let pdfium = load_pdfium().map_err(PdfError::Library)?;
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .map_err(|source| PdfError::Document {
                path: path.clone(),
                source,
            })?;
        let page_count = document.pages().len() as usize;
        Ok(Self { path, page_count })
    }

    fn check_page_index(&self, page_index: usize) -> Result<(), PdfError> {
        if page_index >= self.page_count {
            return Err(PdfError::PageOutOfRange {
                page_index,
                page_count: self.page_count,
            });
        }
        Ok(())
    }
}

impl PageSource for PdfiumPageSource {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> usize {
        self.page_count
    }

    fn native_text(&self, page_index: usize) -> Result<String, PdfError> {
        self.check_page_index(page_index)?;
        let pdfium = load_pdfium().map_err(PdfError::Library)?;
        let document = pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|source| PdfError::Document {
                path: self.path.clone(),
                source,
            })?;
        let page = document
            .pages()
            .get(page_index as u16)
            .map_err(|source| PdfError::PageText { page_index, source })?;
        let text = page
            .text()
            .map_err(|source| PdfError::PageText { page_index, source })?;
        Ok(text.all())
    }

    fn render_page(&self, page_index: usize, dpi: u32) -> Result<PageImage, PdfError> {
        self.check_page_index(page_index)?;
        let pdfium = load_pdfium().map_err(PdfError::Library)?;
        let document = pdfium
            .load_pdf_from_file(&self.path, None)
            .map_err(|source| PdfError::Document {
                path: self.path.clone(),
                source,
            })?;
        let page = document
            .pages()
            .get(page_index as u16)
            .map_err(|source| PdfError::PageRender { page_index, source })?;

        let render_config =
            PdfRenderConfig::new().set_target_width(scaled_width(page.width().value, dpi));
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|source| PdfError::PageRender { page_index, source })?;

        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;
        let rgba = bitmap.as_rgba_bytes();

        let mut png_data = Vec::new();
        PngEncoder::new(&mut png_data)
            .write_image(&rgba, width, height, ExtendedColorType::Rgba8)
            .map_err(|source| PdfError::Encode { page_index, source })?;

        Ok(PageImage {
            page_index,
            width,
            height,
            png_data,
        })
    }
}

/// Pixel width for a page rendered at `dpi`. PDF points are 1/72 inch.
fn scaled_width(points: f32, dpi: u32) -> i32 {
    ((points * dpi as f32 / 72.0).round() as i32).max(1)
}

/// Locate a Pdfium library: an explicit `PDFIUM_LIBRARY_PATH` (file or
/// directory) wins, then a library next to the executable's working
/// directory, then whatever the system provides.
fn load_pdfium() -> Result<Pdfium, PdfiumError> {
    if let Some(value) = env::var_os("PDFIUM_LIBRARY_PATH") {
        let path = PathBuf::from(value);
        if path.is_dir() {
            return Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
                .map(Pdfium::new);
        }
        return Pdfium::bind_to_library(&path).map(Pdfium::new);
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(primary_err) => match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(_) => Err(primary_err),
        },
    }
}
