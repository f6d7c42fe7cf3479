//! Pluggable persistence for the store's index.
//!
//! The in-memory index is always authoritative while the process runs; a
//! strategy only decides what survives a restart. Records are saved and
//! loaded in insertion order.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::db::RedbPersistence;
use super::error::StoreError;
use super::models::FileRecord;
use crate::config::IndexBackend;

/// File name of the JSON snapshot inside the storage root.
pub const SNAPSHOT_FILE: &str = "metadata.json";

/// File name of the redb index inside the storage root.
pub const REDB_FILE: &str = "index.redb";

pub trait IndexPersistence: Send + Sync {
    /// Load every persisted record in insertion order.
    ///
    /// A missing or unreadable index is an empty store, not an error.
    fn load(&self) -> Result<Vec<FileRecord>, StoreError>;

    /// Replace the persisted index with `records`, atomically.
    fn save(&self, records: &[FileRecord]) -> Result<(), StoreError>;

    fn describe(&self) -> &'static str;
}

/// Open the strategy selected by configuration, rooted at `root`.
pub fn open_backend(
    backend: IndexBackend,
    root: &Path,
) -> Result<Box<dyn IndexPersistence>, StoreError> {
    fs::create_dir_all(root)?;
    Ok(match backend {
        IndexBackend::Memory => Box::new(MemoryPersistence),
        IndexBackend::Snapshot => Box::new(JsonSnapshot::new(root.join(SNAPSHOT_FILE))),
        IndexBackend::Redb => Box::new(RedbPersistence::open(root.join(REDB_FILE))?),
    })
}

/// Keeps nothing across restarts.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryPersistence;

impl IndexPersistence for MemoryPersistence {
    fn load(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(Vec::new())
    }

    fn save(&self, _records: &[FileRecord]) -> Result<(), StoreError> {
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "memory"
    }
}

/// Mirrors the index to a single pretty-printed JSON array.
///
/// Writes land in a sibling temp file that is renamed over the snapshot, so a
/// concurrent reader sees either the previous or the next full snapshot.
#[derive(Debug, Clone)]
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn quarantine_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}

impl IndexPersistence for JsonSnapshot {
    fn load(&self) -> Result<Vec<FileRecord>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Vec<FileRecord>>(&data) {
            Ok(records) => Ok(records),
            Err(e) => {
                // Keep the unreadable file around for inspection; the next save
                // would otherwise overwrite it.
                let quarantine = self.quarantine_path();
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %quarantine.display(),
                    error = %e,
                    "Snapshot is corrupt, starting with an empty index"
                );
                if let Err(e) = fs::rename(&self.path, &quarantine) {
                    tracing::warn!(error = %e, "Failed to move corrupt snapshot aside");
                }
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;
        let staging = self.staging_path();
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "snapshot"
    }
}
