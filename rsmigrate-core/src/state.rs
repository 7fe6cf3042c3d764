//! Persisted migration state.

use serde::{Deserialize, Serialize};

/// Durable snapshot of a migration set: registered titles and the cursor.
///
/// Each save overwrites the previous snapshot in full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Migration titles in registration order.
    pub titles: Vec<String>,

    /// Count of migrations applied, from the start of `titles`.
    pub position: usize,
}

impl PersistedState {
    pub fn new(titles: Vec<String>, position: usize) -> Self {
        Self { titles, position }
    }

    /// State of a project where nothing has been applied yet.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Returns true if nothing has ever been recorded.
    pub fn is_fresh(&self) -> bool {
        self.titles.is_empty() && self.position == 0
    }

    /// Titles covered by the cursor.
    ///
    /// Shorter than `position` only if the record is inconsistent.
    pub fn applied_titles(&self) -> &[String] {
        &self.titles[..self.position.min(self.titles.len())]
    }

    /// Returns true if every applied migration has a recorded title.
    pub fn is_consistent(&self) -> bool {
        self.position <= self.titles.len()
    }

    /// Returns the first index below `position` where the recorded title is
    /// missing or differs from `registered`, or `None` if every applied title
    /// matches.
    pub fn diverges_from(&self, registered: &[String]) -> Option<usize> {
        (0..self.position).find(|&i| match self.titles.get(i) {
            Some(title) => registered.get(i) != Some(title),
            None => true,
        })
    }
}
