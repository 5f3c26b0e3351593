//! Pipeline stages for PDF ingestion.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and the orchestrator in [`crate::ingest`] only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ summarize ──▶ postprocess
//! (CLI)     (parser,    (prompt,      (cleanup,
//!            tables)     retry)        length cap)
//!              ▲
//!         fingerprint (duplicate guard, before extraction)
//! ```
//!
//! 1. [`input`]       — CLI only: local path or URL to bytes, bounded by the upload ceiling
//! 2. [`fingerprint`] — SHA-256 of the raw bytes
//! 3. [`extract`]     — validation, page ceiling, per-page text/images/tables;
//!    runs in `spawn_blocking` because parsing is CPU-bound
//! 4. [`tables`]      — grid detection over ruling lines reported by the parser
//! 5. [`summarize`]   — excerpt budget and the retried completion call; the
//!    only stage with network I/O
//! 6. [`postprocess`] — deterministic cleanup of the completion

pub mod extract;
pub mod fingerprint;
pub mod input;
pub mod postprocess;
pub mod summarize;
pub mod tables;
