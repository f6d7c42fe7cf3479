//! The authoritative file record store.
//!
//! `FileStore` owns the index (id -> record) and the on-disk layout:
//!
//! ```text
//! <root>/<id>                    blob
//! <root>/thumbnails/<id>_thumb   thumbnail
//! <root>/tmp/<uuid>[.ext]        in-flight uploads
//! ```
//!
//! The index lives behind a mutex that is only held for in-memory work and
//! the persistence step, never across blob or thumbnail I/O.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::error::StoreError;
use super::models::{FileCategory, FilePatch, FileRecord, NewFile, StoreStats};
use super::persistence::IndexPersistence;
use crate::id;
use crate::media::ThumbnailGenerator;

pub const THUMBNAIL_DIR: &str = "thumbnails";
pub const INCOMING_DIR: &str = "tmp";

struct Entry {
    seq: u64,
    record: FileRecord,
}

#[derive(Default)]
struct Index {
    entries: HashMap<String, Entry>,
    /// Ids handed out whose blob is still being moved into place.
    reserved: HashSet<String>,
    next_seq: u64,
}

impl Index {
    fn from_records(records: Vec<FileRecord>) -> Self {
        let mut index = Index::default();
        for record in records {
            if index.entries.contains_key(&record.id) {
                tracing::warn!(file_id = %record.id, "Duplicate id in persisted index, keeping the first");
                continue;
            }
            index.push(record);
        }
        index
    }

    fn push(&mut self, record: FileRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(record.id.clone(), Entry { seq, record });
    }

    fn allocate_id(&mut self) -> String {
        loop {
            let id = id::new_id();
            if !self.entries.contains_key(&id) && self.reserved.insert(id.clone()) {
                return id;
            }
        }
    }

    fn records(&self) -> Vec<FileRecord> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.record.clone()).collect()
    }
}

pub struct FileStore {
    root: PathBuf,
    thumbnails: PathBuf,
    incoming: PathBuf,
    index: Mutex<Index>,
    persistence: Box<dyn IndexPersistence>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the layout and loading the index.
    ///
    /// Leftover in-flight uploads from a previous run are removed. A persisted
    /// index that cannot be loaded yields an empty store.
    pub fn open<P: AsRef<Path>>(
        root: P,
        persistence: Box<dyn IndexPersistence>,
    ) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let store = Self {
            thumbnails: root.join(THUMBNAIL_DIR),
            incoming: root.join(INCOMING_DIR),
            root,
            index: Mutex::new(Index::default()),
            persistence,
        };

        store.ensure_storage_layout()?;
        store.sweep_incoming();

        let records = store.persistence.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load index, starting empty");
            Vec::new()
        });
        tracing::info!(
            files = records.len(),
            persistence = store.persistence.describe(),
            "Loaded file index"
        );
        *store.lock() = Index::from_records(records);

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========================================================================
    // Path contract
    // ========================================================================

    /// Where the blob for `id` lives. Pure: nothing is checked on disk.
    pub fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Where the thumbnail for `id` lives. Pure: nothing is checked on disk.
    pub fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.thumbnails.join(format!("{id}_thumb"))
    }

    /// A fresh temp path for an upload that is still being received.
    ///
    /// Keeps a sanitized copy of the original extension so extractors can
    /// inspect it.
    pub fn incoming_path(&self, original_name: &str) -> PathBuf {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        self.incoming
            .join(format!("{}{extension}", uuid::Uuid::new_v4().simple()))
    }

    /// Create the blob, thumbnail and incoming directories if absent. Idempotent.
    pub fn ensure_storage_layout(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.thumbnails)?;
        std::fs::create_dir_all(&self.incoming)?;
        Ok(())
    }

    fn sweep_incoming(&self) {
        let entries = match std::fs::read_dir(&self.incoming) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scan incoming upload directory");
                return;
            }
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            if std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Removed abandoned uploads");
        }
    }

    // ========================================================================
    // Record operations
    // ========================================================================

    /// Insert a new record with a freshly allocated id and zeroed counters.
    ///
    /// If the index cannot be persisted the record is rolled back and the
    /// error returned.
    pub fn create(&self, new: NewFile) -> Result<FileRecord, StoreError> {
        self.create_at(new, Utc::now())
    }

    fn create_at(&self, new: NewFile, uploaded_at: DateTime<Utc>) -> Result<FileRecord, StoreError> {
        let mut index = self.lock();
        let id = index.allocate_id();
        self.insert_locked(&mut index, id, new, uploaded_at)
    }

    /// Move a fully received upload to its blob path and record it.
    ///
    /// The index entry is only created once the blob is in place. On failure
    /// nothing stays indexed; a blob already moved is removed again, while a
    /// blob that never moved is left for the caller to discard.
    pub async fn create_from_upload(
        &self,
        incoming: &Path,
        new: NewFile,
    ) -> Result<FileRecord, StoreError> {
        let id = self.lock().allocate_id();
        let blob = self.blob_path(&id);

        if let Err(e) = tokio::fs::rename(incoming, &blob).await {
            self.lock().reserved.remove(&id);
            return Err(e.into());
        }

        let inserted = {
            let mut index = self.lock();
            self.insert_locked(&mut index, id, new, Utc::now())
        };

        if inserted.is_err() {
            if let Err(e) = tokio::fs::remove_file(&blob).await {
                tracing::warn!(path = %blob.display(), error = %e, "Failed to remove orphaned blob");
            }
        }
        inserted
    }

    fn insert_locked(
        &self,
        index: &mut Index,
        id: String,
        new: NewFile,
        uploaded_at: DateTime<Utc>,
    ) -> Result<FileRecord, StoreError> {
        index.reserved.remove(&id);

        let record = FileRecord {
            stored_name: id.clone(),
            id,
            original_name: new.original_name,
            mime_type: new.mime_type,
            size: new.size,
            uploaded_at,
            metadata: new.metadata,
            views: 0,
            downloads: 0,
        };
        index.push(record.clone());

        if let Err(e) = self.persistence.save(&index.records()) {
            index.entries.remove(&record.id);
            return Err(e);
        }

        tracing::debug!(file_id = %record.id, name = %record.original_name, "Created file record");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<FileRecord> {
        self.lock().entries.get(id).map(|e| e.record.clone())
    }

    /// All records, newest upload first; equal timestamps keep insertion order.
    pub fn list(&self) -> Vec<FileRecord> {
        let index = self.lock();
        let mut entries: Vec<&Entry> = index.entries.values().collect();
        entries.sort_by(|a, b| {
            b.record
                .uploaded_at
                .cmp(&a.record.uploaded_at)
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Merge `patch` into the record for `id`. `None` if the id is unknown.
    pub fn update(&self, id: &str, patch: FilePatch) -> Option<FileRecord> {
        let mut index = self.lock();
        let entry = index.entries.get_mut(id)?;
        patch.apply(&mut entry.record);
        let updated = entry.record.clone();

        self.persist_or_log(&index, id, "update");
        Some(updated)
    }

    /// Remove the record for `id`, then its blob and thumbnail (best-effort).
    ///
    /// Returns whether a record existed. Missing files on disk are not errors.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut index = self.lock();
            let removed = index.entries.remove(id).is_some();
            if removed {
                self.persist_or_log(&index, id, "delete");
            }
            removed
        };
        if !removed {
            return false;
        }

        for path in [self.blob_path(id), self.thumbnail_path(id)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file_id = %id, path = %path.display(), error = %e, "Failed to remove file from disk");
                }
            }
        }

        tracing::debug!(file_id = %id, "Deleted file record");
        true
    }

    /// Count an inline view. Unknown ids are ignored.
    pub fn increment_views(&self, id: &str) {
        self.increment(id, "views", |record| {
            record.views = record.views.saturating_add(1)
        });
    }

    /// Count a download. Unknown ids are ignored.
    pub fn increment_downloads(&self, id: &str) {
        self.increment(id, "downloads", |record| {
            record.downloads = record.downloads.saturating_add(1)
        });
    }

    fn increment(&self, id: &str, counter: &'static str, bump: impl FnOnce(&mut FileRecord)) {
        let mut index = self.lock();
        let Some(entry) = index.entries.get_mut(id) else {
            tracing::debug!(file_id = %id, counter, "Ignoring increment for unknown file");
            return;
        };
        bump(&mut entry.record);
        self.persist_or_log(&index, id, counter);
    }

    /// Write the thumbnail for `id` with `generator`.
    ///
    /// Returns `false` when the record is unknown or generation fails. A
    /// thumbnail that lands after its record was deleted is removed again.
    pub async fn generate_thumbnail(
        &self,
        id: &str,
        category: FileCategory,
        generator: &dyn ThumbnailGenerator,
    ) -> bool {
        if self.get(id).is_none() {
            return false;
        }

        let thumb = self.thumbnail_path(id);
        if !generator.generate(&self.blob_path(id), &thumb, category).await {
            return false;
        }
        if self.get(id).is_some() {
            return true;
        }

        match tokio::fs::remove_file(&thumb).await {
            Ok(()) => tracing::debug!(file_id = %id, "Removed thumbnail of deleted file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(file_id = %id, error = %e, "Failed to remove thumbnail of deleted file")
            }
        }
        false
    }

    pub fn stats(&self) -> StoreStats {
        let index = self.lock();
        index
            .entries
            .values()
            .fold(StoreStats::default(), |mut stats, entry| {
                stats.total_files += 1;
                stats.total_downloads += entry.record.downloads;
                stats.total_storage_used += entry.record.size;
                stats
            })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The in-memory index stays authoritative when a save fails; the next
    /// successful save writes the full state again.
    ///
    /// Saves are synchronous, rewrite the whole index and run under the index
    /// lock. On the single-threaded runtime every mutation, counters included,
    /// stalls other requests for one full index write.
    fn persist_or_log(&self, index: &Index, id: &str, operation: &'static str) {
        if let Err(e) = self.persistence.save(&index.records()) {
            tracing::error!(file_id = %id, operation, error = %e, "Failed to persist file index");
        }
    }
}
