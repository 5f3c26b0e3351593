//! Data types shared by the pipeline stages, the store and callers.

use crate::error::PageFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One successfully processed document, as persisted by the artifact store.
///
/// Every field is set once when the ingestion completes and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Opaque identifier (UUID v4).
    pub id: String,
    /// Filename supplied by the uploader.
    pub original_filename: String,
    /// Hex SHA-256 of the raw uploaded bytes; unique across records.
    pub content_hash: String,
    /// Name of the persisted PDF inside the store.
    pub stored_filename: String,
    /// Name of the persisted summary text inside the store.
    pub summary_ref: String,
    pub created_at: DateTime<Utc>,
    pub pages: usize,
    /// Upload size in MiB, rounded to two decimals.
    pub size_mb: f64,
    /// Length of the extracted text in characters.
    pub text_length: usize,
    pub image_count: usize,
    pub table_count: usize,
    /// Whether every page was parsed.
    #[serde(default)]
    pub extraction: ExtractionStatus,
}

/// Metadata handed to the store alongside the artifacts of a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    pub pages: usize,
    pub size_mb: f64,
    pub text_length: usize,
    pub image_count: usize,
    pub table_count: usize,
    pub extraction: ExtractionStatus,
}

impl From<&ExtractedContent> for RecordMetadata {
    fn from(content: &ExtractedContent) -> Self {
        Self {
            pages: content.page_count,
            size_mb: content.size_mb,
            text_length: content.text_length(),
            image_count: content.image_count,
            table_count: content.table_count,
            extraction: content.status.clone(),
        }
    }
}

/// Whether extraction covered every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    #[default]
    Complete,
    /// Some pages failed to parse and contributed nothing.
    Degraded { failed_pages: Vec<PageFailure> },
}

impl ExtractionStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ExtractionStatus::Degraded { .. })
    }
}

/// Content of a PDF, produced by the extractor and consumed by the
/// summariser. Never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub page_count: usize,
    pub image_count: usize,
    pub table_count: usize,
    pub size_mb: f64,
    pub status: ExtractionStatus,
}

impl ExtractedContent {
    pub fn text_length(&self) -> usize {
        self.text.chars().count()
    }
}

/// States of the ingestion state machine.
///
/// `Failed` is not a variant: a failure is an [`crate::error::IngestError`]
/// carrying the stage that was active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Validating,
    CheckingDuplicate,
    Extracting,
    Summarizing,
    Persisting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Validating => "validating",
            Stage::CheckingDuplicate => "checking for duplicates",
            Stage::Extracting => "extracting",
            Stage::Summarizing => "summarizing",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Successful result of [`crate::ingest::Ingestor::ingest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub record: UploadRecord,
    pub summary: String,
    /// True when the bytes matched an existing record and nothing new was stored.
    pub duplicate: bool,
    /// True when only part of the text was sent for summarisation. Always
    /// false for duplicates, which make no completion call.
    pub excerpt_truncated: bool,
}

/// Round a byte count to MiB with two decimals.
pub fn size_in_mb(bytes: usize) -> f64 {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}
