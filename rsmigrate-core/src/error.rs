//! Core error types.

use crate::migration::Direction;
use thiserror::Error;

/// Error type returned by a single migration operation.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from the migration engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot connect to state store: {reason}")]
    Connection { reason: String },

    #[error("persisted migration state is corrupt: {reason}")]
    StateCorrupt { reason: String },

    #[error("target migration not found: {title}")]
    TargetNotFound { title: String },

    #[error("migration '{title}' failed during {direction}: {source}")]
    MigrationStep {
        title: String,
        direction: Direction,
        #[source]
        source: StepError,
    },

    #[error("failed to save migration state: {reason}")]
    Persist { reason: String },
}

impl CoreError {
    /// Returns an error code suitable for display and scripting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Connection { .. } => "CONNECTION_ERROR",
            CoreError::StateCorrupt { .. } => "STATE_CORRUPT",
            CoreError::TargetNotFound { .. } => "TARGET_NOT_FOUND",
            CoreError::MigrationStep { .. } => "MIGRATION_FAILED",
            CoreError::Persist { .. } => "PERSIST_FAILED",
        }
    }

    /// Returns whether the in-memory position may differ from the durable one.
    ///
    /// Only a failed save after migrations ran leaves the two out of step; a
    /// re-run may then apply or revert the same migrations again.
    pub fn state_may_diverge(&self) -> bool {
        matches!(self, CoreError::Persist { .. })
    }

    /// Returns whether the error was raised before any migration executed.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            CoreError::Connection { .. }
                | CoreError::StateCorrupt { .. }
                | CoreError::TargetNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CoreError::TargetNotFound {
            title: "004".to_string(),
        };
        assert_eq!(err.error_code(), "TARGET_NOT_FOUND");
        assert_eq!(err.to_string(), "target migration not found: 004");
        assert!(err.is_pre_execution());
        assert!(!err.state_may_diverge());
    }

    #[test]
    fn test_persist_error_diverges() {
        let err = CoreError::Persist {
            reason: "disk full".to_string(),
        };
        assert!(err.state_may_diverge());
        assert!(!err.is_pre_execution());
    }

    #[test]
    fn test_migration_step_source() {
        let err = CoreError::MigrationStep {
            title: "002".to_string(),
            direction: Direction::Down,
            source: "table missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "migration '002' failed during down: table missing"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
