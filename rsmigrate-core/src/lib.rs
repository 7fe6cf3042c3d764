//! # rsmigrate-core
//!
//! Migration sequencing engine for rsmigrate.
//!
//! This crate provides:
//! - The ordered migration registry and position cursor
//! - Target resolution and run slice computation
//! - Strictly sequential execution with lifecycle events
//! - The persistence gateway traits implemented by storage backends

pub mod engine;
pub mod error;
pub mod events;
pub mod migration;
pub mod plan;
pub mod registry;
pub mod state;
pub mod store;

pub use engine::{FailurePolicy, MigrationStatus, Migrator, RunReport, Status};
pub use error::{CoreError, StepError};
pub use events::{EventBroadcaster, EventKind, RunEvent};
pub use migration::{Direction, FnMigration, Migration};
pub use plan::Plan;
pub use registry::MigrationSet;
pub use state::PersistedState;
pub use store::{StateConnection, StateStore};
