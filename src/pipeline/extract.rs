//! Content extraction: validate the upload, then pull text, image and table
//! counts out of every page.
//!
//! ## Order of checks
//!
//! ```text
//! size ceiling ─▶ %PDF magic ─▶ open ─▶ page ceiling ─▶ pages 1..n
//!  (no parse)     (no parse)   (xref)   (no page decode)  (one at a time)
//! ```
//!
//! Both byte-level checks run before any parser sees the data, so an
//! oversized or foreign upload costs nothing. The page ceiling is checked
//! before any page content is decoded. Each page is decoded in isolation: a
//! page that errors or panics inside the parser, or whose text layer cannot
//! be decoded, is recorded as a [`PageFailure`] and the document is marked
//! degraded. Images and tables on a page with undecodable text still count.

use crate::config::IngestConfig;
use crate::error::{FailureKind, PageFailure, ValidationError};
use crate::model::{size_in_mb, ExtractedContent, ExtractionStatus};
use crate::parser::{PageContent, PdfParser};
use crate::pipeline::tables::count_tables;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Ceilings applied during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub max_bytes: u64,
    pub max_file_size_mb: u64,
    pub max_pages: usize,
}

impl From<&IngestConfig> for ExtractLimits {
    fn from(config: &IngestConfig) -> Self {
        Self {
            max_bytes: config.max_file_size_bytes(),
            max_file_size_mb: config.max_file_size_mb,
            max_pages: config.max_pages,
        }
    }
}

/// Byte-level checks: size ceiling, then the `%PDF` header.
pub fn validate_bytes(bytes: &[u8], limits: &ExtractLimits) -> Result<(), ValidationError> {
    let size = bytes.len() as u64;
    if size > limits.max_bytes {
        return Err(ValidationError::TooLarge {
            size_bytes: size,
            limit_mb: limits.max_file_size_mb,
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ValidationError::InvalidFormat {
            detail: "missing %PDF header".to_string(),
        });
    }
    Ok(())
}

/// Extract content on a blocking thread.
///
/// Parsing is CPU-bound and some backends are not async-safe, so the work
/// runs under `spawn_blocking`. A panic that escapes the per-page guard
/// surfaces as [`FailureKind::Internal`].
pub async fn extract_content(
    parser: Arc<dyn PdfParser>,
    bytes: Arc<Vec<u8>>,
    limits: ExtractLimits,
) -> Result<ExtractedContent, FailureKind> {
    tokio::task::spawn_blocking(move || extract_blocking(parser.as_ref(), &bytes, &limits))
        .await
        .map_err(|e| FailureKind::Internal(format!("extraction task failed: {e}")))?
        .map_err(FailureKind::from)
}

/// Blocking implementation of [`extract_content`].
pub fn extract_blocking(
    parser: &dyn PdfParser,
    bytes: &[u8],
    limits: &ExtractLimits,
) -> Result<ExtractedContent, ValidationError> {
    validate_bytes(bytes, limits)?;

    let document = catch_unwind(AssertUnwindSafe(|| parser.open(bytes))).map_err(|_| {
        ValidationError::InvalidFormat {
            detail: format!("{} parser crashed while reading the document", parser.name()),
        }
    })??;

    let page_count = document.page_count();
    if page_count == 0 {
        return Err(ValidationError::InvalidFormat {
            detail: "document has no pages".to_string(),
        });
    }
    if page_count > limits.max_pages {
        return Err(ValidationError::TooManyPages {
            pages: page_count,
            limit: limits.max_pages,
        });
    }
    debug!("Extracting {} pages with {}", page_count, parser.name());

    let mut texts = Vec::with_capacity(page_count);
    let mut image_count = 0;
    let mut table_count = 0;
    let mut readable_pages = 0;
    let mut failed_pages = Vec::new();

    for index in 0..page_count {
        let result = catch_unwind(AssertUnwindSafe(|| document.page(index)))
            .unwrap_or_else(|_| Err("parser panicked".to_string()));
        match result {
            Ok(PageContent {
                text,
                image_count: images,
                segments,
                text_error,
            }) => {
                readable_pages += 1;
                image_count += images;
                table_count += count_tables(&segments);
                if let Some(detail) = text_error {
                    warn!("Page {}: text skipped: {}", index + 1, detail);
                    failed_pages.push(PageFailure {
                        page: index + 1,
                        detail,
                    });
                }
                texts.push(text);
            }
            Err(detail) => {
                warn!("Page {} could not be parsed: {}", index + 1, detail);
                failed_pages.push(PageFailure {
                    page: index + 1,
                    detail,
                });
            }
        }
    }

    // Only a document with no readable page structure is rejected; pages
    // whose text alone failed still count.
    if readable_pages == 0 {
        return Err(ValidationError::InvalidFormat {
            detail: format!("none of the {page_count} pages could be parsed"),
        });
    }

    let text = texts
        .iter()
        .map(|t| t.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    let status = if failed_pages.is_empty() {
        ExtractionStatus::Complete
    } else {
        ExtractionStatus::Degraded { failed_pages }
    };

    let content = ExtractedContent {
        text,
        page_count,
        image_count,
        table_count,
        size_mb: size_in_mb(bytes.len()),
        status,
    };
    info!(
        "Extracted {} chars, {} images, {} tables from {} pages",
        content.text_length(),
        content.image_count,
        content.table_count,
        content.page_count
    );
    Ok(content)
}
