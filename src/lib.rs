//! # pdf-digest
//!
//! Ingest PDF documents, extract their text and structure, summarise them
//! with an LLM and keep every upload, summary and metadata record for later
//! retrieval.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes
//!  │
//!  ├─ 1. Validate  size ceiling, %PDF header, SHA-256 fingerprint
//!  ├─ 2. Dedupe    identical bytes return the stored record (per-hash lock)
//!  ├─ 3. Extract   text, image and table counts per page (spawn_blocking)
//!  ├─ 4. Summarise one completion call, bounded retries, deadline
//!  └─ 5. Persist   PDF + summary + metadata, committed atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_digest::{IngestConfig, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let config = IngestConfig::builder().storage_dir("./storage").build()?;
//!     let ingestor = Ingestor::open(config).await?;
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let outcome = ingestor.ingest(bytes, "report.pdf").await?;
//!     println!("{} ({} pages)\n{}", outcome.record.id, outcome.record.pages, outcome.summary);
//!
//!     for record in ingestor.get_recent(None).await? {
//!         println!("{}  {}", record.created_at, record.original_filename);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdfdigest` binary (clap + anyhow + tracing-subscriber) |
//! | `pdfium` | off     | Adds [`parser::PdfiumParser`], backed by a pdfium shared library |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-digest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod completion;
pub mod config;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use completion::{CompletionRequest, CompletionService, LlmCompletion};
pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{
    Component, ConfigError, FailureKind, IngestError, InputError, PageFailure, SetupError,
    StorageError, UpstreamError, ValidationError,
};
pub use ingest::Ingestor;
pub use model::{ExtractedContent, ExtractionStatus, IngestOutcome, Stage, UploadRecord};
pub use parser::{default_parser, LopdfParser, PdfParser};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{ArtifactStore, FsArtifactStore};
