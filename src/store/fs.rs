//! Filesystem artifact store.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   pdfs/<id>.pdf         original upload, byte-for-byte
//!   summaries/<id>.txt    summary text (UTF-8)
//!   meta/<id>.json        UploadRecord, written last
//! ```
//!
//! ## Atomicity
//!
//! Every file is written to a temp file in its target directory, synced and
//! renamed into place. The metadata record is the commit point: it is
//! renamed only after both artifacts exist, and a record is added to the
//! in-memory index only after its metadata is durable. If any step fails,
//! the artifacts already written for that id are removed. Temp files left
//! by a crash are swept on [`FsArtifactStore::open`].
//!
//! The commit and the index insert run in a detached task that also owns the
//! hash lock, so a caller dropping [`ArtifactStore::save`] mid-commit cannot
//! leave a durable record missing from the index.
//!
//! ## Index
//!
//! Records are indexed in memory by id, by content hash and by creation
//! order. The index is rebuilt from `meta/` on open; records whose metadata
//! cannot be read or whose artifacts are missing are skipped with a warning.

use super::{ArtifactStore, NewArtifacts, SaveOutcome};
use crate::error::StorageError;
use crate::locks::KeyedLocks;
use crate::model::UploadRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PDF_DIR: &str = "pdfs";
const SUMMARY_DIR: &str = "summaries";
const META_DIR: &str = "meta";
const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
struct Layout {
    pdfs: PathBuf,
    summaries: PathBuf,
    meta: PathBuf,
}

impl Layout {
    fn new(root: &Path) -> Self {
        Self {
            pdfs: root.join(PDF_DIR),
            summaries: root.join(SUMMARY_DIR),
            meta: root.join(META_DIR),
        }
    }

    fn dirs(&self) -> [&Path; 3] {
        [&self.pdfs, &self.summaries, &self.meta]
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.meta.join(format!("{id}.json"))
    }
}

#[derive(Debug, Default)]
struct Index {
    by_id: HashMap<String, UploadRecord>,
    by_hash: HashMap<String, String>,
    /// Ids in ascending `(created_at, id)` order.
    order: Vec<String>,
    last_created: Option<DateTime<Utc>>,
}

impl Index {
    fn insert(&mut self, record: UploadRecord) {
        let pos = self.order.partition_point(|id| {
            let r = &self.by_id[id];
            (r.created_at, r.id.as_str()) < (record.created_at, record.id.as_str())
        });
        self.order.insert(pos, record.id.clone());
        self.by_hash
            .insert(record.content_hash.clone(), record.id.clone());
        if self.last_created.is_none_or(|t| record.created_at > t) {
            self.last_created = Some(record.created_at);
        }
        self.by_id.insert(record.id.clone(), record);
    }

    /// Strictly increasing creation timestamp.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_created {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_created = Some(now);
        now
    }
}

/// [`ArtifactStore`] backed by a directory tree.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    layout: Layout,
    index: Arc<RwLock<Index>>,
    hash_locks: KeyedLocks,
}

impl FsArtifactStore {
    /// Open (or create) a store rooted at `root` and load its index.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let layout = Layout::new(&root);
        let scan_layout = layout.clone();
        let index = tokio::task::spawn_blocking(move || load_index(&scan_layout))
            .await
            .map_err(|e| StorageError::io("open", root.clone(), std::io::Error::other(e)))??;

        info!(
            "Opened artifact store at {} ({} records)",
            root.display(),
            index.order.len()
        );
        Ok(Self {
            root,
            layout,
            index: Arc::new(RwLock::new(index)),
            hash_locks: KeyedLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of committed records.
    pub async fn len(&self) -> usize {
        self.index.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn lookup(&self, id: &str) -> Result<UploadRecord, StorageError> {
        if Uuid::parse_str(id).is_err() {
            return Err(not_found(id));
        }
        self.index
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &str) -> StorageError {
    StorageError::NotFound { id: id.to_string() }
}

/// Map a read failure of a record's artifact: a missing file means the record
/// is corrupt, anything else is an I/O error.
fn artifact_error(id: &str, artifact: &'static str, path: &Path, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::Corrupt {
            id: id.to_string(),
            artifact,
        }
    } else {
        StorageError::io("read", path, e)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, artifacts: NewArtifacts<'_>) -> Result<SaveOutcome, StorageError> {
        let guard = self.hash_locks.lock(artifacts.content_hash).await;

        let created_at = {
            let mut index = self.index.write().await;
            if let Some(existing) = index
                .by_hash
                .get(artifacts.content_hash)
                .and_then(|id| index.by_id.get(id))
            {
                debug!("Hash {} already stored as {}", artifacts.content_hash, existing.id);
                return Ok(SaveOutcome::Existing(existing.clone()));
            }
            index.next_timestamp()
        };

        let id = Uuid::new_v4().to_string();
        let meta = &artifacts.metadata;
        let record = UploadRecord {
            id: id.clone(),
            original_filename: artifacts.filename.to_string(),
            content_hash: artifacts.content_hash.to_string(),
            stored_filename: format!("{id}.pdf"),
            summary_ref: format!("{id}.txt"),
            created_at,
            pages: meta.pages,
            size_mb: meta.size_mb,
            text_length: meta.text_length,
            image_count: meta.image_count,
            table_count: meta.table_count,
            extraction: meta.extraction.clone(),
        };

        let layout = self.layout.clone();
        let bytes = artifacts.original_bytes.to_vec();
        let summary = artifacts.summary.to_string();
        let to_write = record.clone();
        let index = Arc::clone(&self.index);
        let root = self.root.clone();
        let commit = tokio::spawn(async move {
            let _guard = guard;
            let committed = to_write.clone();
            tokio::task::spawn_blocking(move || commit_blocking(&layout, &to_write, &bytes, &summary))
                .await
                .map_err(|e| StorageError::io("commit", root, std::io::Error::other(e)))??;
            index.write().await.insert(committed);
            Ok::<(), StorageError>(())
        });
        commit
            .await
            .map_err(|e| StorageError::io("commit", self.root.clone(), std::io::Error::other(e)))??;

        info!("Stored record {} ({})", record.id, record.original_filename);
        Ok(SaveOutcome::Created(record))
    }

    async fn get_record(&self, id: &str) -> Result<UploadRecord, StorageError> {
        self.lookup(id).await
    }

    async fn get_file(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let record = self.lookup(id).await?;
        let path = self.layout.pdfs.join(&record.stored_filename);
        tokio::fs::read(&path)
            .await
            .map_err(|e| artifact_error(id, "pdf", &path, e))
    }

    async fn get_summary(&self, id: &str) -> Result<String, StorageError> {
        let record = self.lookup(id).await?;
        let path = self.layout.summaries.join(&record.summary_ref);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| artifact_error(id, "summary", &path, e))
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<UploadRecord>, StorageError> {
        let index = self.index.read().await;
        Ok(index
            .by_hash
            .get(content_hash)
            .and_then(|id| index.by_id.get(id))
            .cloned())
    }

    async fn list_recent(&self, n: usize) -> Result<Vec<UploadRecord>, StorageError> {
        let index = self.index.read().await;
        Ok(index
            .order
            .iter()
            .rev()
            .take(n)
            .filter_map(|id| index.by_id.get(id).cloned())
            .collect())
    }
}

// ── Blocking I/O ────────────────────────────────────────────────────────────

/// Write `data` to `dir/name` via a synced temp file and a rename.
fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
    let target = dir.join(name);
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| StorageError::io("create temp file", dir, e))?;
    tmp.write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| StorageError::io("write", tmp.path().to_path_buf(), e))?;
    tmp.persist(&target)
        .map_err(|e| StorageError::io("rename", &target, e.error))?;
    Ok(target)
}

fn commit_blocking(
    layout: &Layout,
    record: &UploadRecord,
    bytes: &[u8],
    summary: &str,
) -> Result<(), StorageError> {
    let meta_path = layout.meta_path(&record.id);
    let json = serde_json::to_vec_pretty(record).map_err(|source| StorageError::Serialization {
        path: meta_path.clone(),
        source,
    })?;

    let mut written = Vec::with_capacity(2);
    let result = write_artifacts(layout, record, bytes, summary, &json, &mut written);

    if let Err(ref e) = result {
        warn!("Commit of {} failed, removing partial artifacts: {}", record.id, e);
        for path in written {
            if let Err(rm) = std::fs::remove_file(&path) {
                warn!("Could not remove {}: {}", path.display(), rm);
            }
        }
    }
    result
}

/// Artifacts first, metadata last. Paths of renamed artifacts go to `written`.
fn write_artifacts(
    layout: &Layout,
    record: &UploadRecord,
    bytes: &[u8],
    summary: &str,
    json: &[u8],
    written: &mut Vec<PathBuf>,
) -> Result<(), StorageError> {
    written.push(write_atomic(&layout.pdfs, &record.stored_filename, bytes)?);
    written.push(write_atomic(
        &layout.summaries,
        &record.summary_ref,
        summary.as_bytes(),
    )?);
    write_atomic(&layout.meta, &format!("{}.json", record.id), json)?;
    Ok(())
}

fn load_index(layout: &Layout) -> Result<Index, StorageError> {
    for dir in layout.dirs() {
        std::fs::create_dir_all(dir).map_err(|e| StorageError::io("create directory", dir, e))?;
        sweep_temp_files(dir);
    }

    let mut records = Vec::new();
    let entries =
        std::fs::read_dir(&layout.meta).map_err(|e| StorageError::io("list", &layout.meta, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_record(layout, &path) {
            Ok(record) => records.push(record),
            Err(reason) => warn!("Skipping metadata record {}: {}", path.display(), reason),
        }
    }

    records.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

    let mut index = Index::default();
    for record in records {
        if let Some(first) = index.by_hash.get(&record.content_hash) {
            warn!(
                "Skipping record {}: content hash already stored as {}",
                record.id, first
            );
            continue;
        }
        index.insert(record);
    }
    Ok(index)
}

fn read_record(layout: &Layout, path: &Path) -> Result<UploadRecord, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    let record: UploadRecord = serde_json::from_slice(&data).map_err(|e| e.to_string())?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if record.id != stem || Uuid::parse_str(&record.id).is_err() {
        return Err(format!("record id '{}' does not match its file name", record.id));
    }
    if !layout.pdfs.join(&record.stored_filename).is_file() {
        return Err("stored PDF is missing".to_string());
    }
    if !layout.summaries.join(&record.summary_ref).is_file() {
        return Err("summary is missing".to_string());
    }
    Ok(record)
}

fn sweep_temp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let is_temp = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(TEMP_PREFIX));
        if is_temp {
            debug!("Removing leftover temp file {}", entry.path().display());
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionStatus, RecordMetadata};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn metadata() -> RecordMetadata {
        RecordMetadata {
            pages: 2,
            size_mb: 0.01,
            text_length: 120,
            image_count: 1,
            table_count: 0,
            extraction: ExtractionStatus::Complete,
        }
    }

    fn artifacts<'a>(bytes: &'a [u8], hash: &'a str, name: &'a str) -> NewArtifacts<'a> {
        NewArtifacts {
            original_bytes: bytes,
            filename: name,
            content_hash: hash,
            summary: "A short summary.",
            metadata: metadata(),
        }
    }

    #[tokio::test]
    async fn save_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        let outcome = store
            .save(artifacts(b"%PDF-1.4 one", "h1", "one.pdf"))
            .await
            .unwrap();
        let SaveOutcome::Created(record) = outcome else {
            panic!("expected a new record");
        };

        assert_eq!(store.get_record(&record.id).await.unwrap(), record);
        assert_eq!(store.get_file(&record.id).await.unwrap(), b"%PDF-1.4 one".to_vec());
        assert_eq!(store.get_summary(&record.id).await.unwrap(), "A short summary.");
        assert_eq!(record.original_filename, "one.pdf");
        assert_eq!(record.image_count, 1);
        assert!(dir.path().join("meta").join(format!("{}.json", record.id)).is_file());
    }

    #[tokio::test]
    async fn same_hash_returns_existing() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        let first = store.save(artifacts(b"%PDF a", "same", "a.pdf")).await.unwrap();
        let second = store.save(artifacts(b"%PDF a", "same", "b.pdf")).await.unwrap();

        assert!(matches!(first, SaveOutcome::Created(_)));
        assert!(matches!(second, SaveOutcome::Existing(_)));
        assert_eq!(first.record().id, second.record().id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..7 {
            let hash = format!("hash-{i}");
            let name = format!("doc-{i}.pdf");
            let outcome = store.save(artifacts(b"%PDF", &hash, &name)).await.unwrap();
            ids.push(outcome.into_record().id);
        }

        let recent: Vec<String> = store
            .list_recent(5)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let expected: Vec<String> = ids.iter().rev().take(5).cloned().collect();
        assert_eq!(recent, expected);
        assert_eq!(store.list_recent(50).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn reopen_rebuilds_index() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = FsArtifactStore::open(dir.path()).await.unwrap();
            store.save(artifacts(b"%PDF x", "hx", "x.pdf")).await.unwrap();
            store
                .save(artifacts(b"%PDF y", "hy", "y.pdf"))
                .await
                .unwrap()
                .into_record()
                .id
        };

        let store = FsArtifactStore::open(dir.path()).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.list_recent(1).await.unwrap()[0].id, id);
        assert_eq!(store.find_by_hash("hx").await.unwrap().unwrap().original_filename, "x.pdf");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        assert!(store.get_record("../../etc/passwd").await.unwrap_err().is_not_found());
        let missing = Uuid::new_v4().to_string();
        assert!(store.get_summary(&missing).await.unwrap_err().is_not_found());
        assert!(store.get_file(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unreadable_metadata_is_skipped() {
        let dir = TempDir::new().unwrap();
        {
            let store = FsArtifactStore::open(dir.path()).await.unwrap();
            store.save(artifacts(b"%PDF ok", "ok", "ok.pdf")).await.unwrap();
        }
        let bogus = Uuid::new_v4();
        std::fs::write(dir.path().join("meta").join(format!("{bogus}.json")), b"{not json").unwrap();

        let store = FsArtifactStore::open(dir.path()).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn leftover_temp_files_are_swept() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        let leftover = dir.path().join("pdfs").join(".tmp-abc123");
        std::fs::write(&leftover, b"partial").unwrap();

        let _store = FsArtifactStore::open(dir.path()).await.unwrap();
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn failed_commit_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        // Replace the summaries directory with a file so the second write fails.
        let summaries = dir.path().join("summaries");
        std::fs::remove_dir(&summaries).unwrap();
        std::fs::write(&summaries, b"").unwrap();

        let err = store.save(artifacts(b"%PDF z", "hz", "z.pdf")).await;
        assert!(err.is_err());
        assert!(store.is_empty().await);
        assert!(store.find_by_hash("hz").await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(dir.path().join("pdfs")).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(dir.path().join("meta")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn dropped_save_still_indexes_its_record() {
        use futures::FutureExt;

        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::open(dir.path()).await.unwrap();

        // One poll reaches the commit, then the caller goes away.
        let first = store.save(artifacts(b"%PDF once", "hc", "c.pdf")).now_or_never();
        assert!(first.is_none());

        let mut stored = None;
        for _ in 0..200 {
            stored = store.find_by_hash("hc").await.unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let stored = stored.expect("commit finished after the caller was dropped");

        let again = store
            .save(artifacts(b"%PDF once", "hc", "c-again.pdf"))
            .await
            .unwrap();
        let SaveOutcome::Existing(existing) = again else {
            panic!("expected the committed record");
        };
        assert_eq!(existing, stored);
        assert_eq!(store.len().await, 1);
        assert_eq!(std::fs::read_dir(dir.path().join("meta")).unwrap().count(), 1);
    }
}
