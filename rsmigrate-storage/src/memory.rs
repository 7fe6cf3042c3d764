//! In-process state store.
//!
//! Keeps records in memory behind a lock, encoded the same way as the file
//! store so corruption handling behaves identically. Counts connections and
//! accesses and can inject faults, which makes it the store of choice for
//! embedding tests.

use crate::codec;
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rsmigrate_core::{CoreError, PersistedState, StateConnection, StateStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct RawRecord {
    titles: String,
    position: usize,
}

/// Access counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub loads: u64,
    pub saves: u64,
}

impl StoreStats {
    /// Connections opened but not closed yet.
    pub fn open_connections(&self) -> u64 {
        self.connections_opened - self.connections_closed
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: RwLock<HashMap<String, RawRecord>>,
    stats: Mutex<StoreStats>,
    fail_connect: AtomicBool,
    fail_save: AtomicBool,
}

/// Memory-backed state store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Inner>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `state` under `storage_key`.
    pub fn with_state(storage_key: &str, state: &PersistedState) -> Result<Self, StorageError> {
        let store = Self::new();
        store.put(storage_key, state)?;
        Ok(store)
    }

    /// Writes a record directly, bypassing connections.
    pub fn put(&self, storage_key: &str, state: &PersistedState) -> Result<(), StorageError> {
        codec::validate_key(storage_key)?;
        let titles = codec::encode_titles(&state.titles)?;
        self.insert_raw(storage_key, titles, state.position);
        Ok(())
    }

    /// Stores an arbitrary titles payload, valid or not.
    pub fn insert_raw(&self, storage_key: &str, titles: impl Into<String>, position: usize) {
        self.inner.records.write().insert(
            storage_key.to_string(),
            RawRecord {
                titles: titles.into(),
                position,
            },
        );
    }

    /// Damages the titles payload of an existing record.
    pub fn corrupt(&self, storage_key: &str) -> bool {
        match self.inner.records.write().get_mut(storage_key) {
            Some(record) => {
                record.titles.push_str("\u{0}garbage");
                true
            }
            None => false,
        }
    }

    /// Reads the decoded record for `storage_key`.
    pub fn get(&self, storage_key: &str) -> Result<Option<PersistedState>, StorageError> {
        let records = self.inner.records.read();
        match records.get(storage_key) {
            Some(record) => {
                let titles = codec::decode_titles(&record.titles)?;
                Ok(Some(PersistedState::new(titles, record.position)))
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, storage_key: &str) -> bool {
        self.inner.records.read().contains_key(storage_key)
    }

    pub fn stats(&self) -> StoreStats {
        *self.inner.stats.lock()
    }

    /// Makes subsequent connects fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent saves fail.
    pub fn set_fail_save(&self, fail: bool) {
        self.inner.fail_save.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn connect(&self, storage_key: &str) -> Result<Box<dyn StateConnection>, CoreError> {
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(
                StorageError::Unavailable("memory store offline".into()).into_connect_error(),
            );
        }
        codec::validate_key(storage_key).map_err(StorageError::into_connect_error)?;

        self.inner.stats.lock().connections_opened += 1;
        Ok(Box::new(MemoryConnection {
            storage_key: storage_key.to_string(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryConnection {
    storage_key: String,
    inner: Arc<Inner>,
}

#[async_trait]
impl StateConnection for MemoryConnection {
    async fn load(&mut self) -> Result<PersistedState, CoreError> {
        self.inner.stats.lock().loads += 1;

        let records = self.inner.records.read();
        match records.get(&self.storage_key) {
            Some(record) => {
                let titles =
                    codec::decode_titles(&record.titles).map_err(StorageError::into_load_error)?;
                codec::check_position(record.position, titles.len())
                    .map_err(StorageError::into_load_error)?;
                Ok(PersistedState::new(titles, record.position))
            }
            None => Ok(PersistedState::fresh()),
        }
    }

    async fn save(&mut self, state: &PersistedState) -> Result<(), CoreError> {
        if self.inner.fail_save.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("save rejected".into()).into_save_error());
        }

        let titles = codec::encode_titles(&state.titles).map_err(StorageError::into_save_error)?;
        self.inner.records.write().insert(
            self.storage_key.clone(),
            RawRecord {
                titles,
                position: state.position,
            },
        );
        self.inner.stats.lock().saves += 1;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.inner.stats.lock().connections_closed += 1;
    }
}
