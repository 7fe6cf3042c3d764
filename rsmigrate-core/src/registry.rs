//! Ordered migration registry and position tracker.

use crate::migration::{Direction, Migration};
use std::sync::Arc;

/// Ordered collection of migrations bound to one persisted record.
///
/// Order is exactly the registration order; nothing here sorts. The
/// position counts applied migrations from the start of the sequence and
/// stays within `0..=len()`.
pub struct MigrationSet {
    migrations: Vec<Arc<dyn Migration>>,
    position: usize,
    storage_key: String,
}

impl MigrationSet {
    /// Creates an empty set whose state is stored under `storage_key`.
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            migrations: Vec::new(),
            position: 0,
            storage_key: storage_key.into(),
        }
    }

    /// Appends a migration.
    pub fn register(&mut self, migration: impl Migration + 'static) {
        self.migrations.push(Arc::new(migration));
    }

    /// Appends an already shared migration.
    pub fn register_arc(&mut self, migration: Arc<dyn Migration>) {
        self.migrations.push(migration);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_migration(mut self, migration: impl Migration + 'static) -> Self {
        self.register(migration);
        self
    }

    /// Returns the index of the first migration with this exact title.
    pub fn index_of(&self, title: &str) -> Option<usize> {
        self.migrations.iter().position(|m| m.title() == title)
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn Migration>> {
        self.migrations.get(index)
    }

    /// Returns all titles in registration order.
    pub fn titles(&self) -> Vec<String> {
        self.migrations.iter().map(|m| m.title().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Identity of the persisted record for this set.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Number of migrations currently applied.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of registered migrations not yet applied.
    pub fn pending(&self) -> usize {
        self.migrations.len() - self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        debug_assert!(position <= self.migrations.len());
        self.position = position.min(self.migrations.len());
    }

    /// Moves the cursor one step after a migration completed.
    pub(crate) fn step(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.set_position(self.position + 1),
            Direction::Down => self.set_position(self.position.saturating_sub(1)),
        }
    }
}

impl std::fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationSet")
            .field("storage_key", &self.storage_key)
            .field("position", &self.position)
            .field("titles", &self.titles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::FnMigration;
    use futures::FutureExt;

    fn noop(title: &str) -> FnMigration {
        FnMigration::new(
            title,
            || async { Ok(()) }.boxed(),
            || async { Ok(()) }.boxed(),
        )
    }

    #[test]
    fn test_registration_order() {
        let set = MigrationSet::new("default")
            .with_migration(noop("003"))
            .with_migration(noop("001"))
            .with_migration(noop("002"));

        assert_eq!(set.titles(), vec!["003", "001", "002"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.storage_key(), "default");
    }

    #[test]
    fn test_index_of() {
        let set = MigrationSet::new("default")
            .with_migration(noop("001"))
            .with_migration(noop("002"));

        assert_eq!(set.index_of("001"), Some(0));
        assert_eq!(set.index_of("002"), Some(1));
        assert_eq!(set.index_of("00"), None);
        assert_eq!(set.index_of("missing"), None);
    }

    #[test]
    fn test_duplicate_title_first_wins() {
        let set = MigrationSet::new("default")
            .with_migration(noop("001"))
            .with_migration(noop("002"))
            .with_migration(noop("001"));

        assert_eq!(set.index_of("001"), Some(0));
    }

    #[test]
    fn test_position_steps() {
        let mut set = MigrationSet::new("default")
            .with_migration(noop("001"))
            .with_migration(noop("002"));
        assert_eq!(set.position(), 0);
        assert_eq!(set.pending(), 2);

        set.step(Direction::Up);
        set.step(Direction::Up);
        assert_eq!(set.position(), 2);
        assert_eq!(set.pending(), 0);

        set.step(Direction::Down);
        assert_eq!(set.position(), 1);
    }

    #[test]
    fn test_empty_set() {
        let set = MigrationSet::new("default");
        assert!(set.is_empty());
        assert!(set.get(0).is_none());
        assert!(set.titles().is_empty());
    }
}
