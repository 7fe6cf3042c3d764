//! Storage error types.

use rsmigrate_core::CoreError;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid storage key '{0}': expected [A-Za-z0-9_.-]+")]
    InvalidKey(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Maps an error raised while opening a connection.
    pub fn into_connect_error(self) -> CoreError {
        CoreError::Connection {
            reason: self.to_string(),
        }
    }

    /// Maps an error raised while loading the record.
    ///
    /// Anything that was read but could not be decoded is corruption; failing
    /// to read at all means the backend is unreachable.
    pub fn into_load_error(self) -> CoreError {
        match self {
            StorageError::Json(_) | StorageError::Corruption(_) => CoreError::StateCorrupt {
                reason: self.to_string(),
            },
            StorageError::Io(_) | StorageError::InvalidKey(_) | StorageError::Unavailable(_) => {
                CoreError::Connection {
                    reason: self.to_string(),
                }
            }
        }
    }

    /// Maps an error raised while saving the record.
    pub fn into_save_error(self) -> CoreError {
        CoreError::Persist {
            reason: self.to_string(),
        }
    }
}
