//! Durable file-backed state store.
//!
//! Each storage key maps to one record file, `<dir>/<key>.json`. Saves write
//! a temporary file, fsync it, and rename it over the record.

use crate::codec;
use crate::error::StorageError;
use async_trait::async_trait;
use rsmigrate_core::{CoreError, PersistedState, StateConnection, StateStore};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Record layout on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Storage key this record belongs to.
    pub id: String,
    /// JSON-encoded title array.
    pub titles: String,
    pub position: usize,
    /// CRC32C of `titles`.
    pub checksum: String,
    /// Last write (Unix millis).
    pub updated_at: i64,
}

impl StoredRecord {
    pub fn encode(id: &str, state: &PersistedState) -> Result<Self, StorageError> {
        let titles = codec::encode_titles(&state.titles)?;
        Ok(Self {
            id: id.to_string(),
            checksum: codec::checksum(&titles),
            titles,
            position: state.position,
            updated_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn decode(self, id: &str) -> Result<PersistedState, StorageError> {
        if self.id != id {
            return Err(StorageError::Corruption(format!(
                "record belongs to '{}', expected '{}'",
                self.id, id
            )));
        }

        let actual = codec::checksum(&self.titles);
        if actual != self.checksum {
            return Err(StorageError::Corruption(format!(
                "titles checksum mismatch (expected {}, got {})",
                self.checksum, actual
            )));
        }

        let titles = codec::decode_titles(&self.titles)?;
        codec::check_position(self.position, titles.len())?;
        Ok(PersistedState::new(titles, self.position))
    }
}

/// State store keeping one JSON record file per storage key.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// connect.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `storage_key`.
    pub fn record_path(&self, storage_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", storage_key))
    }

    async fn open(&self, storage_key: &str) -> Result<FileConnection, StorageError> {
        codec::validate_key(storage_key)?;
        fs::create_dir_all(&self.dir).await?;

        let meta = fs::metadata(&self.dir).await?;
        if !meta.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }

        Ok(FileConnection {
            storage_key: storage_key.to_string(),
            path: self.record_path(storage_key),
        })
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn connect(&self, storage_key: &str) -> Result<Box<dyn StateConnection>, CoreError> {
        let conn = self
            .open(storage_key)
            .await
            .map_err(StorageError::into_connect_error)?;
        tracing::debug!("Opened state record {}", conn.path.display());
        Ok(Box::new(conn))
    }
}

/// Connection to one record file.
#[derive(Debug)]
pub struct FileConnection {
    storage_key: String,
    path: PathBuf,
}

impl FileConnection {
    async fn read(&self) -> Result<PersistedState, StorageError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PersistedState::fresh()),
            Err(e) => return Err(e.into()),
        };

        let record: StoredRecord = serde_json::from_slice(&data).map_err(|e| {
            StorageError::Corruption(format!("{}: {}", self.path.display(), e))
        })?;
        record.decode(&self.storage_key)
    }

    async fn write(&self, state: &PersistedState) -> Result<(), StorageError> {
        let record = StoredRecord::encode(&self.storage_key, state)?;
        let data = serde_json::to_vec_pretty(&record)?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(e) = Self::publish(&tmp_path, &self.path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn publish(tmp_path: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(tmp_path, path).await
    }
}

#[async_trait]
impl StateConnection for FileConnection {
    async fn load(&mut self) -> Result<PersistedState, CoreError> {
        let state = self.read().await.map_err(StorageError::into_load_error)?;
        tracing::debug!(
            "Loaded state '{}': position {} of {} titles",
            self.storage_key,
            state.position,
            state.titles.len()
        );
        Ok(state)
    }

    async fn save(&mut self, state: &PersistedState) -> Result<(), CoreError> {
        self.write(state)
            .await
            .map_err(StorageError::into_save_error)?;
        tracing::info!(
            "Saved state '{}' at position {}",
            self.storage_key,
            state.position
        );
        Ok(())
    }

    async fn close(self: Box<Self>) {
        tracing::debug!("Closed state record {}", self.path.display());
    }
}
