//! Run planning: target resolution and slice computation.

use crate::error::CoreError;
use crate::migration::Direction;
use crate::registry::MigrationSet;
use std::ops::Range;

/// The ordered slice of migrations one run will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Run direction.
    pub direction: Direction,
    /// Requested target title, if any.
    pub target: Option<String>,
    /// Cursor before the run.
    pub from: usize,
    /// Cursor after every step succeeds.
    pub to: usize,
    /// Migration indices in execution order.
    pub steps: Vec<usize>,
}

impl Plan {
    /// Resolves `target` against `set` and computes the slice to run from
    /// `position`.
    ///
    /// An unknown target is [`CoreError::TargetNotFound`]; a position past the
    /// end of the set is [`CoreError::StateCorrupt`].
    pub fn compute(
        set: &MigrationSet,
        position: usize,
        direction: Direction,
        target: Option<&str>,
    ) -> Result<Self, CoreError> {
        if position > set.len() {
            return Err(CoreError::StateCorrupt {
                reason: format!(
                    "position {} exceeds the {} registered migrations",
                    position,
                    set.len()
                ),
            });
        }

        let target_index = target
            .map(|title| {
                set.index_of(title)
                    .ok_or_else(|| CoreError::TargetNotFound {
                        title: title.to_string(),
                    })
            })
            .transpose()?;

        let range = slice_range(direction, position, set.len(), target_index);
        let count = range.len();
        let (steps, to) = match direction {
            Direction::Up => (range.collect(), position + count),
            Direction::Down => (range.rev().collect(), position - count),
        };

        Ok(Self {
            direction,
            target: target.map(|s| s.to_string()),
            from: position,
            to,
            steps,
        })
    }

    /// Returns true if the run has nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Titles of the planned steps, in execution order.
    pub fn titles(&self, set: &MigrationSet) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|&i| set.get(i))
            .map(|m| m.title().to_string())
            .collect()
    }
}

/// Computes the contiguous index range covered by a run.
///
/// `up` covers `[position, target]` inclusive (or to the end without a
/// target); `down` covers `[target, position)` (or from the start). A target
/// on the wrong side of the cursor yields an empty range.
pub fn slice_range(
    direction: Direction,
    position: usize,
    len: usize,
    target_index: Option<usize>,
) -> Range<usize> {
    match direction {
        Direction::Up => {
            let end = target_index.map_or(len, |i| i + 1);
            position..end.max(position)
        }
        Direction::Down => {
            let start = target_index.unwrap_or(0);
            start.min(position)..position
        }
    }
}
