//! Progress-callback trait for ingestion stage events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to observe the
//! state machine as an upload moves through it. Callers can forward events to
//! a terminal spinner, a channel or a log without the library knowing how the
//! host application communicates.
//!
//! # Example
//!
//! ```rust
//! use pdf_digest::{IngestConfig, IngestProgressCallback, Stage};
//! use std::sync::{Arc, Mutex};
//!
//! struct Recorder(Mutex<Vec<Stage>>);
//!
//! impl IngestProgressCallback for Recorder {
//!     fn on_stage(&self, _filename: &str, stage: Stage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(Recorder(Mutex::new(Vec::new()))))
//!     .build()
//!     .unwrap();
//! ```

use crate::model::Stage;
use std::sync::Arc;

/// Called by the orchestrator as an ingestion advances.
///
/// Implementations must be `Send + Sync`: several ingestions may run
/// concurrently and report through the same callback. All methods default
/// to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called on entry to each stage, `Received` first and `Done` last.
    fn on_stage(&self, filename: &str, stage: Stage) {
        let _ = (filename, stage);
    }

    /// Called when the pipeline skipped some pages it could not parse.
    ///
    /// # Arguments
    /// * `failed_pages` — 1-indexed numbers of the skipped pages
    fn on_degraded(&self, filename: &str, failed_pages: &[usize]) {
        let _ = (filename, failed_pages);
    }

    /// Called once when the ingestion ends in `Failed`.
    ///
    /// # Arguments
    /// * `stage` — the stage that was active
    /// * `error` — the user-facing message
    fn on_failed(&self, filename: &str, stage: Stage, error: &str) {
        let _ = (filename, stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
