//! Persistence gateway.
//!
//! The engine talks to durable storage only through these two traits:
//! a [`StateStore`] hands out one [`StateConnection`] per run, and the
//! connection reads and writes the single record identified by the storage
//! key it was opened with.

use crate::error::CoreError;
use crate::state::PersistedState;
use async_trait::async_trait;

/// Factory for per-run connections to the state backend.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Opens a connection scoped to the record `storage_key`.
    ///
    /// Fails with [`CoreError::Connection`] if the backend is unreachable.
    async fn connect(&self, storage_key: &str) -> Result<Box<dyn StateConnection>, CoreError>;
}

/// Handle to the single migration-state record of one project.
#[async_trait]
pub trait StateConnection: Send {
    /// Loads the record, or [`PersistedState::fresh`] if none exists.
    ///
    /// Fails with [`CoreError::StateCorrupt`] if the record cannot be decoded.
    async fn load(&mut self) -> Result<PersistedState, CoreError>;

    /// Inserts or overwrites the record.
    ///
    /// Fails with [`CoreError::Persist`].
    async fn save(&mut self, state: &PersistedState) -> Result<(), CoreError>;

    /// Releases the connection.
    async fn close(self: Box<Self>);
}

/// A connection acquired on first use and released exactly once.
pub(crate) struct ScopedConnection<'a> {
    store: &'a dyn StateStore,
    storage_key: &'a str,
    conn: Option<Box<dyn StateConnection>>,
}

impl<'a> ScopedConnection<'a> {
    pub(crate) fn new(store: &'a dyn StateStore, storage_key: &'a str) -> Self {
        Self {
            store,
            storage_key,
            conn: None,
        }
    }

    async fn acquire(&mut self) -> Result<&mut Box<dyn StateConnection>, CoreError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                tracing::debug!("Connecting to state store for '{}'", self.storage_key);
                self.store.connect(self.storage_key).await?
            }
        };
        Ok(self.conn.insert(conn))
    }

    pub(crate) async fn load(&mut self) -> Result<PersistedState, CoreError> {
        self.acquire().await?.load().await
    }

    pub(crate) async fn save(&mut self, state: &PersistedState) -> Result<(), CoreError> {
        self.acquire().await?.save(state).await
    }

    /// Closes the connection if one was opened.
    pub(crate) async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
            tracing::debug!("Released state store connection for '{}'", self.storage_key);
        }
    }
}
