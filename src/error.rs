//! Error types for the pdf-digest library.
//!
//! Each pipeline component raises its own error type:
//!
//! * [`ValidationError`] — **client-caused**: the upload is not a usable PDF or
//!   exceeds a configured ceiling. Never retried; the message names the limit.
//! * [`UpstreamError`] — **external-service-caused**: the completion service
//!   failed. `Unavailable` and `RateLimited` are retried with backoff inside the
//!   summarisation client; `InvalidResponse` surfaces immediately.
//! * [`StorageError`] — **persistence-layer**: always fatal to the current
//!   ingestion and never partially committed.
//!
//! The orchestrator wraps whichever of these it receives in an [`IngestError`]
//! together with the [`Stage`] that failed. It adds context, it never changes
//! the kind. [`PageFailure`] is the one non-fatal error: a single page that
//! could not be parsed, recorded on the stored record rather than propagated.

use crate::model::Stage;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ── Validation ────────────────────────────────────────────────────────────

/// The uploaded bytes were rejected before any summarisation work began.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Bytes are not a parseable PDF, or the document is encrypted.
    #[error("File is not a valid PDF: {detail}")]
    InvalidFormat { detail: String },

    /// Raw byte length exceeds the configured ceiling.
    #[error("PDF file too large: {size_mb:.2} MB (max {limit_mb} MB)", size_mb = bytes_to_mb(.size_bytes))]
    TooLarge { size_bytes: u64, limit_mb: u64 },

    /// The document has more pages than allowed.
    #[error("PDF has too many pages: {pages} (max {limit})")]
    TooManyPages { pages: usize, limit: usize },
}

fn bytes_to_mb(bytes: &u64) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

// ── Upstream ──────────────────────────────────────────────────────────────

/// Failure of the external completion service.
///
/// `Display` includes the raw detail for logs. Use
/// [`IngestError::user_message`] for anything shown to end users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Network failure, 5xx, or a call that exceeded its timeout.
    #[error("completion service unavailable: {detail}")]
    Unavailable { detail: String },

    /// Quota exceeded (HTTP 429 or equivalent).
    #[error("completion service rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The service answered, but with an empty or malformed completion.
    #[error("completion service returned an invalid response: {detail}")]
    InvalidResponse { detail: String },
}

impl UpstreamError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::Unavailable { .. } | UpstreamError::RateLimited { .. }
        )
    }
}

// ── Storage ───────────────────────────────────────────────────────────────

/// Failure of the artifact store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error during {op} on '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metadata record could not be encoded or decoded.
    #[error("metadata record '{path}' could not be (de)serialised: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No record exists under the requested identifier.
    #[error("no record with id '{id}'")]
    NotFound { id: String },

    /// A record exists but one of its artifacts is missing.
    #[error("record '{id}' is missing its {artifact}")]
    Corrupt { id: String, artifact: &'static str },
}

impl StorageError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

// ── Config ────────────────────────────────────────────────────────────────

/// Builder validation failed, or no completion provider could be resolved.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// The orchestrator could not be constructed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("artifact store could not be opened: {0}")]
    Storage(#[from] StorageError),
}

// ── Input (CLI) ───────────────────────────────────────────────────────────

/// A path or URL given on the command line could not be turned into bytes.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Download of {url} timed out after {secs}s")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input exceeds the upload ceiling; nothing past the limit was read.
    #[error("Input {input} exceeds the {limit_mb} MB upload limit")]
    TooLarge { input: String, limit_mb: u64 },
}

// ── Orchestrator ──────────────────────────────────────────────────────────

/// The component an ingestion failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Extractor,
    Summarizer,
    Store,
    Runtime,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Extractor => "extractor",
            Component::Summarizer => "summarizer",
            Component::Store => "store",
            Component::Runtime => "runtime",
        };
        f.write_str(name)
    }
}

/// The component error carried by an [`IngestError`], unchanged.
#[derive(Debug, Error)]
pub enum FailureKind {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A blocking task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Terminal failure of one ingestion: `Failed(reason)` in the state machine.
#[derive(Debug, Error)]
#[error("ingestion failed while {stage}: {kind}")]
pub struct IngestError {
    pub stage: Stage,
    #[source]
    pub kind: FailureKind,
}

impl IngestError {
    pub fn new(stage: Stage, kind: impl Into<FailureKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    /// The component whose error this is.
    pub fn component(&self) -> Component {
        match &self.kind {
            FailureKind::Validation(_) => Component::Extractor,
            FailureKind::Upstream(_) => Component::Summarizer,
            FailureKind::Storage(_) => Component::Store,
            FailureKind::Internal(_) => Component::Runtime,
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match &self.kind {
            FailureKind::Validation(e) => Some(e),
            _ => None,
        }
    }

    pub fn upstream(&self) -> Option<&UpstreamError> {
        match &self.kind {
            FailureKind::Upstream(e) => Some(e),
            _ => None,
        }
    }

    /// Message safe to show to the uploader.
    ///
    /// Validation failures name the exceeded limit. Upstream and storage
    /// failures are generic: no retry counts, upstream bodies or paths.
    pub fn user_message(&self) -> String {
        match &self.kind {
            FailureKind::Validation(e) => e.to_string(),
            FailureKind::Upstream(UpstreamError::RateLimited { .. }) => {
                "Summarization is temporarily unavailable (service busy). Please try again later."
                    .to_string()
            }
            FailureKind::Upstream(_) => {
                "Summarization is temporarily unavailable. Please try again later.".to_string()
            }
            FailureKind::Storage(_) | FailureKind::Internal(_) => {
                "The document could not be processed due to an internal error.".to_string()
            }
        }
    }
}

/// A single page that failed to parse. Non-fatal: the page contributes
/// nothing and the document is marked as degraded.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("page {page}: {detail}")]
pub struct PageFailure {
    /// 1-indexed page number.
    pub page: usize,
    pub detail: String,
}
