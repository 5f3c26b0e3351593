//! Ingestion orchestrator.
//!
//! ## State machine
//!
//! ```text
//! Received ─▶ Validating ─▶ CheckingDuplicate ─┬─▶ Extracting ─▶ Summarizing ─▶ Persisting ─▶ Done
//!                 │                │            └─▶ Done (duplicate: existing record, no new work)
//!                 ▼                ▼                    ▼              ▼              ▼
//!              Failed           Failed               Failed         Failed         Failed
//! ```
//!
//! Validating covers the size ceiling, the `%PDF` header and the
//! fingerprint. The per-hash lock is taken before the duplicate check and
//! held until the record is committed, so concurrent uploads of identical
//! bytes make one completion call and create one record; the later ones see
//! the committed record as a duplicate. Uploads with different bytes run
//! fully in parallel.
//!
//! Nothing is persisted on any failure path: the store is written only in
//! Persisting, and its commit is atomic.

use crate::completion::{CompletionService, LlmCompletion};
use crate::config::IngestConfig;
use crate::error::{FailureKind, IngestError, SetupError, StorageError};
use crate::locks::KeyedLocks;
use crate::model::{ExtractedContent, IngestOutcome, RecordMetadata, Stage, UploadRecord};
use crate::parser::{default_parser, PdfParser};
use crate::pipeline::extract::{extract_content, validate_bytes, ExtractLimits};
use crate::pipeline::fingerprint::fingerprint;
use crate::pipeline::summarize::{Summarizer, SummarizerSettings};
use crate::store::{ArtifactStore, FsArtifactStore, NewArtifacts, SaveOutcome};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entry point for uploads and lookups.
///
/// Cheap to share: wrap it in an `Arc` and call [`Ingestor::ingest`] from as
/// many tasks as needed.
pub struct Ingestor {
    config: IngestConfig,
    parser: Arc<dyn PdfParser>,
    summarizer: Summarizer,
    store: Arc<dyn ArtifactStore>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("config", &self.config)
            .field("parser", &self.parser.name())
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    /// Assemble an orchestrator from explicit components.
    pub fn new(
        config: IngestConfig,
        parser: Arc<dyn PdfParser>,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let summarizer = Summarizer::new(completion, SummarizerSettings::from(&config));
        Self {
            config,
            parser,
            summarizer,
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Build the default stack: lopdf parser, provider resolved from the
    /// configuration, filesystem store at `config.storage_dir`.
    pub async fn open(config: IngestConfig) -> Result<Self, SetupError> {
        let completion = LlmCompletion::from_config(&config)?;
        let store = FsArtifactStore::open(config.storage_dir.clone()).await?;
        Ok(Self::new(
            config,
            default_parser(),
            Arc::new(completion),
            Arc::new(store),
        ))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run one upload through the state machine.
    ///
    /// On success returns the record, its summary and whether the bytes were
    /// already known. A duplicate returns the existing record and stored
    /// summary without extraction or a completion call.
    pub async fn ingest(&self, bytes: Vec<u8>, filename: &str) -> Result<IngestOutcome, IngestError> {
        let started = Instant::now();
        self.enter(filename, Stage::Received);

        // Validating
        self.enter(filename, Stage::Validating);
        let limits = ExtractLimits::from(&self.config);
        validate_bytes(&bytes, &limits).map_err(|e| self.fail(filename, Stage::Validating, e))?;
        let hash = fingerprint(&bytes);
        debug!("{}: fingerprint {}", filename, hash);

        // CheckingDuplicate, lock held until the record is committed
        self.enter(filename, Stage::CheckingDuplicate);
        let _guard = self.locks.lock(&hash).await;
        let existing = self
            .store
            .find_by_hash(&hash)
            .await
            .map_err(|e| self.fail(filename, Stage::CheckingDuplicate, e))?;
        if let Some(record) = existing {
            info!("{}: duplicate of {}", filename, record.id);
            let summary = self
                .store
                .get_summary(&record.id)
                .await
                .map_err(|e| self.fail(filename, Stage::CheckingDuplicate, e))?;
            self.enter(filename, Stage::Done);
            return Ok(IngestOutcome {
                record,
                summary,
                duplicate: true,
                excerpt_truncated: false,
            });
        }

        // Extracting
        self.enter(filename, Stage::Extracting);
        let bytes = Arc::new(bytes);
        let content = extract_content(Arc::clone(&self.parser), Arc::clone(&bytes), limits)
            .await
            .map_err(|e| self.fail(filename, Stage::Extracting, e))?;
        self.report_degraded(filename, &content);

        // Summarizing
        self.enter(filename, Stage::Summarizing);
        let summary = self
            .summarizer
            .summarize(&content)
            .await
            .map_err(|e| self.fail(filename, Stage::Summarizing, e))?;

        // Persisting
        self.enter(filename, Stage::Persisting);
        let outcome = self
            .store
            .save(NewArtifacts {
                original_bytes: &bytes,
                filename,
                content_hash: &hash,
                summary: &summary.text,
                metadata: RecordMetadata::from(&content),
            })
            .await
            .map_err(|e| self.fail(filename, Stage::Persisting, e))?;

        let (record, duplicate, summary_text) = match outcome {
            SaveOutcome::Created(record) => (record, false, summary.text),
            // Another process committed the same bytes first; keep its summary.
            SaveOutcome::Existing(record) => {
                let stored = self
                    .store
                    .get_summary(&record.id)
                    .await
                    .map_err(|e| self.fail(filename, Stage::Persisting, e))?;
                (record, true, stored)
            }
        };

        self.enter(filename, Stage::Done);
        info!(
            "{}: ingested as {} in {:.1}s ({} pages, {} completion attempts)",
            filename,
            record.id,
            started.elapsed().as_secs_f64(),
            record.pages,
            summary.attempts
        );
        Ok(IngestOutcome {
            record,
            summary: summary_text,
            duplicate,
            excerpt_truncated: summary.omitted_chars > 0,
        })
    }

    /// Validate and extract without summarising or storing anything.
    pub async fn inspect(&self, bytes: Vec<u8>) -> Result<ExtractedContent, IngestError> {
        let limits = ExtractLimits::from(&self.config);
        validate_bytes(&bytes, &limits).map_err(|e| IngestError::new(Stage::Validating, e))?;
        extract_content(Arc::clone(&self.parser), Arc::new(bytes), limits)
            .await
            .map_err(|e| IngestError::new(Stage::Extracting, e))
    }

    /// The stored summary of a record. Repeated calls return identical text.
    pub async fn get_summary(&self, id: &str) -> Result<String, StorageError> {
        self.store.get_summary(id).await
    }

    pub async fn get_record(&self, id: &str) -> Result<UploadRecord, StorageError> {
        self.store.get_record(id).await
    }

    /// The stored PDF, byte-identical to the upload.
    pub async fn get_file(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        self.store.get_file(id).await
    }

    /// The most recent records, newest first; `config.history_limit` when
    /// `limit` is `None`.
    pub async fn get_recent(&self, limit: Option<usize>) -> Result<Vec<UploadRecord>, StorageError> {
        let n = limit.unwrap_or(self.config.history_limit);
        self.store.list_recent(n).await
    }

    // ── helpers ────────────────────────────────────────────────────────────

    fn enter(&self, filename: &str, stage: Stage) {
        debug!("{}: {}", filename, stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(filename, stage);
        }
    }

    fn fail(&self, filename: &str, stage: Stage, kind: impl Into<FailureKind>) -> IngestError {
        let err = IngestError::new(stage, kind);
        warn!("{}: {} ({} error)", filename, err, err.component());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_failed(filename, stage, &err.user_message());
        }
        err
    }

    fn report_degraded(&self, filename: &str, content: &ExtractedContent) {
        if let crate::model::ExtractionStatus::Degraded { ref failed_pages } = content.status {
            let pages: Vec<usize> = failed_pages.iter().map(|f| f.page).collect();
            warn!("{}: pages {:?} could not be parsed and were skipped", filename, pages);
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_degraded(filename, &pages);
            }
        }
    }
}
