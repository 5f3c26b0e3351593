//! Artifact store: the original PDF, its summary and the metadata record.
//!
//! The orchestrator only sees [`ArtifactStore`]. The filesystem
//! implementation, [`FsArtifactStore`], is the only medium shipped.
//!
//! A record is visible to readers only once all three artifacts are durable:
//! there is no state in which a record exists but its file or summary does
//! not.

use crate::error::StorageError;
use crate::model::{RecordMetadata, UploadRecord};
use async_trait::async_trait;

pub mod fs;

pub use fs::FsArtifactStore;

/// Everything needed to persist one new upload.
#[derive(Debug, Clone)]
pub struct NewArtifacts<'a> {
    pub original_bytes: &'a [u8],
    pub filename: &'a str,
    pub content_hash: &'a str,
    pub summary: &'a str,
    pub metadata: RecordMetadata,
}

/// Result of [`ArtifactStore::save`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// A new record was committed.
    Created(UploadRecord),
    /// A record with the same content hash already existed; nothing was written.
    Existing(UploadRecord),
}

impl SaveOutcome {
    pub fn record(&self) -> &UploadRecord {
        match self {
            SaveOutcome::Created(r) | SaveOutcome::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> UploadRecord {
        match self {
            SaveOutcome::Created(r) | SaveOutcome::Existing(r) => r,
        }
    }
}

/// Durable storage for upload records and their artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist the artifacts and create a record, atomically.
    ///
    /// At most one record exists per content hash: saving a hash that is
    /// already stored returns [`SaveOutcome::Existing`] and writes nothing.
    async fn save(&self, artifacts: NewArtifacts<'_>) -> Result<SaveOutcome, StorageError>;

    async fn get_record(&self, id: &str) -> Result<UploadRecord, StorageError>;

    /// Bytes of the stored PDF, identical to the upload.
    async fn get_file(&self, id: &str) -> Result<Vec<u8>, StorageError>;

    async fn get_summary(&self, id: &str) -> Result<String, StorageError>;

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<UploadRecord>, StorageError>;

    /// The `n` most recent records, newest first.
    async fn list_recent(&self, n: usize) -> Result<Vec<UploadRecord>, StorageError>;
}
