//! Backend built on the pdfium C++ library via `pdfium-render`.
//!
//! pdfium is not safe to call from async contexts; like every parser it is
//! only driven from `spawn_blocking` by the extractor.

use super::{encrypted, PageContent, ParsedDocument, PdfParser};
use crate::error::{ConfigError, ValidationError};
use crate::pipeline::tables::Segment;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Parser backed by a dynamically bound pdfium library.
pub struct PdfiumParser {
    pdfium: Pdfium,
}

impl std::fmt::Debug for PdfiumParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumParser").finish_non_exhaustive()
    }
}

impl PdfiumParser {
    /// Bind pdfium: `PDFIUM_LIB_PATH` first, then the working directory,
    /// then the system library search path.
    pub fn bind() -> Result<Self, ConfigError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => {
                info!("Binding pdfium from PDFIUM_LIB_PATH={path}");
                Pdfium::bind_to_library(&path)
            }
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConfigError(format!("pdfium library could not be loaded: {e:?}")))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PdfParser for PdfiumParser {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn ParsedDocument + 'a>, ValidationError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| {
                let err_str = format!("{e:?}");
                if err_str.contains("Password") || err_str.contains("password") {
                    encrypted()
                } else {
                    ValidationError::InvalidFormat { detail: err_str }
                }
            })?;
        debug!("pdfium opened document with {} pages", document.pages().len());
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl ParsedDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page(&self, index: usize) -> Result<PageContent, String> {
        let page_index = index
            .try_into()
            .map_err(|_| format!("page index {index} out of range"))?;
        let page = self
            .document
            .pages()
            .get(page_index)
            .map_err(|e| format!("{e:?}"))?;

        let (text, text_error) = match page.text() {
            Ok(text) => (text.all(), None),
            Err(e) => (String::new(), Some(format!("text extraction failed: {e:?}"))),
        };

        let mut image_count = 0;
        let mut segments = Vec::new();
        for object in page.objects().iter() {
            match object.object_type() {
                PdfPageObjectType::Image => image_count += 1,
                PdfPageObjectType::Path => {
                    if let Ok(bounds) = object.bounds() {
                        let (left, bottom) = (bounds.left().value, bounds.bottom().value);
                        segments.extend(Segment::from_rect(
                            left,
                            bottom,
                            bounds.right().value - left,
                            bounds.top().value - bottom,
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(PageContent {
            text,
            image_count,
            segments,
            text_error,
        })
    }
}
