//! Migration definitions.

use crate::error::StepError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply migrations forward.
    Up,
    /// Revert applied migrations.
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, reversible unit of change.
///
/// Implementations must not change their title after registration. The
/// engine awaits each operation to completion before starting the next one.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique title within a migration set.
    fn title(&self) -> &str;

    /// Applies the change.
    async fn up(&self) -> Result<(), StepError>;

    /// Reverts the change.
    async fn down(&self) -> Result<(), StepError>;

    /// Runs the operation for the given direction.
    async fn run(&self, direction: Direction) -> Result<(), StepError> {
        match direction {
            Direction::Up => self.up().await,
            Direction::Down => self.down().await,
        }
    }
}

type StepFn = Box<dyn Fn() -> BoxFuture<'static, Result<(), StepError>> + Send + Sync>;

/// Migration built from a pair of closures.
///
/// ```
/// use futures::FutureExt;
/// use rsmigrate_core::FnMigration;
///
/// let migration = FnMigration::new(
///     "001-create-users",
///     || async { Ok(()) }.boxed(),
///     || async { Ok(()) }.boxed(),
/// );
/// ```
pub struct FnMigration {
    title: String,
    up: StepFn,
    down: StepFn,
}

impl FnMigration {
    pub fn new<U, D>(title: impl Into<String>, up: U, down: D) -> Self
    where
        U: Fn() -> BoxFuture<'static, Result<(), StepError>> + Send + Sync + 'static,
        D: Fn() -> BoxFuture<'static, Result<(), StepError>> + Send + Sync + 'static,
    {
        Self {
            title: title.into(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }
}

impl fmt::Debug for FnMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMigration")
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Migration for FnMigration {
    fn title(&self) -> &str {
        &self.title
    }

    async fn up(&self) -> Result<(), StepError> {
        (self.up)().await
    }

    async fn down(&self) -> Result<(), StepError> {
        (self.down)().await
    }
}
