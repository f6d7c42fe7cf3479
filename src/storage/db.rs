use redb::{Database as RedbDatabase, DatabaseError, ReadableTable, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::StoreError;
use super::models::FileRecord;
use super::persistence::IndexPersistence;
use super::tables::*;

/// Index persistence backed by an embedded redb database (ACID, crash-safe).
pub struct RedbPersistence {
    db: Arc<RedbDatabase>,
    path: PathBuf,
}

impl Clone for RedbPersistence {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            path: self.path.clone(),
        }
    }
}

impl RedbPersistence {
    /// Open or create the database file. A file redb reports as corrupt is
    /// moved aside and replaced with an empty database; every other open
    /// error is returned.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match RedbDatabase::create(&path) {
            Ok(db) => db,
            Err(DatabaseError::Storage(StorageError::Corrupted(reason))) => {
                let mut quarantine = path.as_os_str().to_owned();
                quarantine.push(".corrupt");
                tracing::warn!(
                    path = %path.display(),
                    reason = %reason,
                    "Index database is corrupt, starting with an empty index"
                );
                std::fs::rename(&path, PathBuf::from(quarantine))?;
                RedbDatabase::create(&path)?
            }
            // Locked, outdated or unreadable files stay in place
            Err(e) => return Err(e.into()),
        };
        let db = Arc::new(db);

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_table(RECORD_ORDER)?;
        }
        write_txn.commit()?;

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexPersistence for RedbPersistence {
    fn load(&self) -> Result<Vec<FileRecord>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let order = read_txn.open_table(RECORD_ORDER)?;
        let records = read_txn.open_table(RECORDS)?;

        let mut files = Vec::new();
        for entry in order.iter()? {
            let (_, id) = entry?;
            let id = id.value();
            let Some(data) = records.get(id)? else {
                tracing::warn!(file_id = %id, "Ordered id has no record, skipping");
                continue;
            };
            match rmp_serde::from_slice::<FileRecord>(data.value()) {
                Ok(file) => files.push(file),
                Err(e) => {
                    tracing::warn!(file_id = %id, error = %e, "Skipping undecodable record");
                }
            }
        }

        Ok(files)
    }

    fn save(&self, files: &[FileRecord]) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS)?;
            let keys: Vec<String> = records
                .iter()?
                .map(|r| r.map(|(k, _)| k.value().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            for key in keys {
                records.remove(key.as_str())?;
            }

            let mut order = write_txn.open_table(RECORD_ORDER)?;
            let seqs: Vec<u64> = order
                .iter()?
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()?;
            for seq in seqs {
                order.remove(seq)?;
            }

            for (seq, file) in files.iter().enumerate() {
                let data = rmp_serde::to_vec_named(file)?;
                records.insert(file.id.as_str(), data.as_slice())?;
                order.insert(seq as u64, file.id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "redb"
    }
}
