//! PDF parsing backends.
//!
//! The extractor never talks to a PDF library directly. It asks a
//! [`PdfParser`] to open the bytes and then pulls one page at a time through
//! [`ParsedDocument`], so the page-count ceiling is checked before any page
//! content is decoded and a page that fails to parse costs only that page.
//!
//! | Backend | Feature | Notes |
//! |---------|---------|-------|
//! | [`LopdfParser`] | always | Pure Rust, no runtime dependencies (default) |
//! | [`PdfiumParser`] | `pdfium` | Needs a pdfium shared library at runtime |
//!
//! Image and table counts are best-effort signals; the two backends may
//! disagree on the same document.

use crate::error::ValidationError;
use crate::pipeline::tables::Segment;
use std::sync::Arc;

pub mod lopdf_parser;
#[cfg(feature = "pdfium")]
pub mod pdfium_parser;

pub use lopdf_parser::LopdfParser;
#[cfg(feature = "pdfium")]
pub use pdfium_parser::PdfiumParser;

/// Raw content of one page.
///
/// Text, images and ruling lines are read independently: a page whose text
/// layer cannot be decoded still reports its images and segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub text: String,
    pub image_count: usize,
    /// Stroked or filled straight lines, input to table detection.
    pub segments: Vec<Segment>,
    /// Set when the text layer could not be decoded; `text` is then empty.
    pub text_error: Option<String>,
}

/// A PDF library capable of opening a document from memory.
pub trait PdfParser: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Open the document structure without decoding page content.
    ///
    /// Fails with [`ValidationError::InvalidFormat`] when the bytes are not a
    /// PDF the backend can read, or when the document is encrypted.
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn ParsedDocument + 'a>, ValidationError>;
}

/// An opened document.
pub trait ParsedDocument {
    fn page_count(&self) -> usize;

    /// Decode page `index` (0-based). An error means the page structure
    /// itself could not be read; text decoding failures are reported through
    /// [`PageContent::text_error`] instead. Either is recorded, not propagated.
    fn page(&self, index: usize) -> Result<PageContent, String>;
}

/// The backend used when the caller does not choose one.
pub fn default_parser() -> Arc<dyn PdfParser> {
    Arc::new(LopdfParser)
}

pub(crate) fn encrypted() -> ValidationError {
    ValidationError::InvalidFormat {
        detail: "document is encrypted or password-protected".to_string(),
    }
}
