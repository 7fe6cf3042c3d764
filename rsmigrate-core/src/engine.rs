//! Migration engine - coordinates the registry, state store and events.

use crate::error::CoreError;
use crate::events::{EventBroadcaster, EventKind, RunEvent};
use crate::migration::{Direction, Migration};
use crate::plan::Plan;
use crate::registry::MigrationSet;
use crate::state::PersistedState;
use crate::store::{ScopedConnection, StateStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// What to persist when a migration step fails mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Leave the stored record untouched unless the whole slice succeeds.
    #[default]
    SuccessOnly,
    /// Save the position reached by the completed steps, then fail.
    PersistProgress,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub direction: Direction,
    /// Position before the run.
    pub from: usize,
    /// Position after the run.
    pub to: usize,
    /// Titles executed, in order.
    pub executed: Vec<String>,
}

/// Applied/pending status of one registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub title: String,
    pub applied: bool,
}

/// Snapshot of a project's migration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub storage_key: String,
    /// Stored position.
    pub position: usize,
    pub migrations: Vec<MigrationStatus>,
    /// Titles as last persisted.
    pub persisted_titles: Vec<String>,
    /// First applied index whose stored title differs from the registered one.
    pub divergence: Option<usize>,
}

impl Status {
    pub fn pending(&self) -> usize {
        self.migrations.iter().filter(|m| !m.applied).count()
    }
}

/// The migration engine.
///
/// Runs take `&mut self`, so one engine never runs twice at once. Nothing
/// guards against two engines sharing a storage key.
pub struct Migrator {
    set: MigrationSet,
    store: Arc<dyn StateStore>,
    events: Arc<EventBroadcaster>,
    policy: FailurePolicy,
}

impl Migrator {
    /// Creates an engine over `set` persisting through `store`.
    pub fn new(set: MigrationSet, store: Arc<dyn StateStore>) -> Self {
        Self {
            set,
            store,
            events: Arc::new(EventBroadcaster::default()),
            policy: FailurePolicy::default(),
        }
    }

    /// Uses a shared broadcaster instead of a private one.
    pub fn with_events(mut self, events: Arc<EventBroadcaster>) -> Self {
        self.events = events;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Subscribes to the events of subsequent runs.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.set
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Applies migrations from the cursor through `target` (inclusive), or
    /// through the last one.
    pub async fn up(&mut self, target: Option<&str>) -> Result<RunReport, CoreError> {
        self.run(Direction::Up, target).await
    }

    /// Reverts applied migrations, newest first, down to and including
    /// `target`, or all of them.
    pub async fn down(&mut self, target: Option<&str>) -> Result<RunReport, CoreError> {
        self.run(Direction::Down, target).await
    }

    /// Executes one run.
    ///
    /// Emits `load`, one `migration` per step, then either `complete` and
    /// `save`, or `error`. The state store connection is released on every
    /// path.
    pub async fn run(
        &mut self,
        direction: Direction,
        target: Option<&str>,
    ) -> Result<RunReport, CoreError> {
        let run_id = Uuid::new_v4();
        let store = Arc::clone(&self.store);
        let storage_key = self.set.storage_key().to_string();
        let mut conn = ScopedConnection::new(store.as_ref(), &storage_key);

        let result = self.execute(run_id, &mut conn, direction, target).await;
        if let Err(e) = &result {
            self.notify_error(run_id, e);
        }
        conn.release().await;

        result
    }

    /// Computes what a run would execute without executing or saving.
    pub async fn plan(
        &mut self,
        direction: Direction,
        target: Option<&str>,
    ) -> Result<Plan, CoreError> {
        let run_id = Uuid::new_v4();
        let store = Arc::clone(&self.store);
        let storage_key = self.set.storage_key().to_string();
        let mut conn = ScopedConnection::new(store.as_ref(), &storage_key);

        let result = match self.load(run_id, &mut conn).await {
            Ok(state) => Plan::compute(&self.set, state.position, direction, target),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.notify_error(run_id, e);
        }
        conn.release().await;

        result
    }

    /// Loads the stored state and reports which migrations are applied.
    pub async fn status(&mut self) -> Result<Status, CoreError> {
        let run_id = Uuid::new_v4();
        let store = Arc::clone(&self.store);
        let storage_key = self.set.storage_key().to_string();
        let mut conn = ScopedConnection::new(store.as_ref(), &storage_key);

        let result = self.load(run_id, &mut conn).await;
        if let Err(e) = &result {
            self.notify_error(run_id, e);
        }
        conn.release().await;
        let state = result?;

        let registered = self.set.titles();
        Ok(Status {
            storage_key,
            position: state.position,
            divergence: state.diverges_from(&registered),
            migrations: registered
                .into_iter()
                .enumerate()
                .map(|(i, title)| MigrationStatus {
                    title,
                    applied: i < state.position,
                })
                .collect(),
            persisted_titles: state.titles,
        })
    }

    async fn execute(
        &mut self,
        run_id: Uuid,
        conn: &mut ScopedConnection<'_>,
        direction: Direction,
        target: Option<&str>,
    ) -> Result<RunReport, CoreError> {
        let state = self.load(run_id, conn).await?;
        let plan = Plan::compute(&self.set, state.position, direction, target)?;
        self.set.set_position(plan.from);

        tracing::info!(
            %run_id,
            "Running {} from position {} ({} step(s), target {})",
            direction,
            plan.from,
            plan.len(),
            plan.target.as_deref().unwrap_or("<none>")
        );

        let steps: Vec<Arc<dyn Migration>> = plan
            .steps
            .iter()
            .filter_map(|&i| self.set.get(i).cloned())
            .collect();

        let mut executed = Vec::with_capacity(steps.len());
        for migration in steps {
            let title = migration.title().to_string();
            self.events.notify(
                run_id,
                EventKind::Migration {
                    title: title.clone(),
                    direction,
                },
            );

            if let Err(source) = migration.run(direction).await {
                let err = CoreError::MigrationStep {
                    title,
                    direction,
                    source,
                };
                if self.policy == FailurePolicy::PersistProgress {
                    if let Err(save_err) = self.persist(run_id, conn).await {
                        tracing::warn!(
                            %run_id,
                            "Failed to save progress after migration failure: {}",
                            save_err
                        );
                    }
                }
                return Err(err);
            }

            self.set.step(direction);
            executed.push(title);
        }

        self.events.notify(
            run_id,
            EventKind::Complete {
                position: self.set.position(),
            },
        );
        self.persist(run_id, conn).await?;

        Ok(RunReport {
            run_id,
            direction,
            from: plan.from,
            to: self.set.position(),
            executed,
        })
    }

    async fn load(
        &self,
        run_id: Uuid,
        conn: &mut ScopedConnection<'_>,
    ) -> Result<PersistedState, CoreError> {
        self.events.notify(run_id, EventKind::Load);
        let state = conn.load().await?;

        if !state.is_consistent() {
            return Err(CoreError::StateCorrupt {
                reason: format!(
                    "position {} exceeds the {} recorded titles",
                    state.position,
                    state.titles.len()
                ),
            });
        }

        if let Some(index) = state.diverges_from(&self.set.titles()) {
            tracing::warn!(
                %run_id,
                "Stored migration '{}' at index {} does not match the registered sequence",
                state.titles.get(index).map(String::as_str).unwrap_or("?"),
                index
            );
        }

        Ok(state)
    }

    async fn persist(
        &self,
        run_id: Uuid,
        conn: &mut ScopedConnection<'_>,
    ) -> Result<(), CoreError> {
        let state = PersistedState::new(self.set.titles(), self.set.position());
        self.events.notify(
            run_id,
            EventKind::Save {
                position: state.position,
            },
        );

        conn.save(&state).await.map_err(|e| match e {
            CoreError::Persist { .. } => e,
            other => CoreError::Persist {
                reason: other.to_string(),
            },
        })
    }

    fn notify_error(&self, run_id: Uuid, err: &CoreError) {
        self.events.notify(
            run_id,
            EventKind::Error {
                code: err.error_code().to_string(),
                message: err.to_string(),
            },
        );
    }
}
