//! Migration Manager - plans and drives `up`, `down`, `run` and `status`
//!
//! Every operation walks `Idle -> Planning -> Executing -> Committed | Failed`.
//! A plan with nothing to do goes straight back to `Idle`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backends::MigrationBackend;
use crate::descriptor::ChangeDescriptor;
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::Ledger;
use crate::mirror::MirrorSync;
use crate::runner::{MigrationRunner, PartialRollback};
use crate::store::MigrationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{}' (expected up or down)", other)),
        }
    }
}

/// Where the manager is in executing a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Planning,
    Executing,
    Committed,
    Failed,
}

/// Migration status in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MigrationStatus {
    Pending,
    Applied {
        applied_at: DateTime<Utc>,
        batch: i32,
    },
}

/// One line of `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub name: String,
    pub table_name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

impl StatusRow {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, MigrationStatus::Applied { .. })
    }
}

/// What one `up` or `down` batch did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub direction: Direction,
    pub batch: i32,
    /// Migrations that completed, in execution order
    pub completed: Vec<String>,
    pub partial_rollbacks: Vec<PartialRollback>,
}

impl BatchReport {
    fn new(direction: Direction, batch: i32) -> Self {
        Self {
            direction,
            batch,
            completed: Vec::new(),
            partial_rollbacks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    NothingToDo,
    Executed(BatchReport),
}

/// Result of a targeted `run`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub migration: String,
    pub direction: Direction,
    /// Batch assigned by an up run; down runs assign none
    pub batch: Option<i32>,
    pub partial_rollback: Option<PartialRollback>,
}

pub struct MigrationManager {
    store: MigrationStore,
    runner: MigrationRunner,
    mirror: Option<Box<dyn MirrorSync>>,
    state: ManagerState,
}

impl MigrationManager {
    pub fn new(store: MigrationStore, backend: Arc<dyn MigrationBackend>) -> Self {
        Self {
            store,
            runner: MigrationRunner::new(backend),
            mirror: None,
            state: ManagerState::Idle,
        }
    }

    /// Regenerate the mirror after every fully successful `up`
    pub fn with_mirror(mut self, mirror: Box<dyn MirrorSync>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn store(&self) -> &MigrationStore {
        &self.store
    }

    /// Apply every pending migration as one new batch
    pub async fn up(&mut self) -> MigrateResult<PlanOutcome> {
        self.transition(ManagerState::Planning);
        let (descriptors, ledger) = self.load(Direction::Up).await?;

        let applied = ledger.applied_names();
        let pending: Vec<&ChangeDescriptor> = descriptors
            .iter()
            .filter(|descriptor| !applied.contains(descriptor.name.to_string().as_str()))
            .collect();

        if pending.is_empty() {
            tracing::info!("Nothing to migrate");
            self.transition(ManagerState::Idle);
            return Ok(PlanOutcome::NothingToDo);
        }

        let batch = ledger.current_batch() + 1;
        tracing::info!(pending = pending.len(), batch, "Planned migration batch");
        self.transition(ManagerState::Executing);

        let mut report = BatchReport::new(Direction::Up, batch);
        for descriptor in pending {
            let name = descriptor.name.to_string();
            if let Err(e) = self.runner.apply_up(descriptor, batch).await {
                return Err(self.halt(name, report, e));
            }
            report.completed.push(name);
        }

        self.transition(ManagerState::Committed);
        tracing::info!(batch, applied = report.completed.len(), "Migration batch committed");

        if let Some(mirror) = &self.mirror {
            match mirror.sync(&descriptors) {
                Ok(synced) => tracing::info!(tables = synced.tables.len(), "Synchronized models"),
                Err(e) => {
                    tracing::error!(batch, error = %e, "Model sync failed after the batch committed");
                    return Err(MigrateError::SyncFailed {
                        report,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(PlanOutcome::Executed(report))
    }

    /// Roll back the most recent batch, newest migration first
    pub async fn down(&mut self) -> MigrateResult<PlanOutcome> {
        self.transition(ManagerState::Planning);
        let (descriptors, ledger) = self.load(Direction::Down).await?;

        let batch = ledger.current_batch();
        if batch == 0 {
            tracing::info!("Nothing to roll back");
            self.transition(ManagerState::Idle);
            return Ok(PlanOutcome::NothingToDo);
        }

        let entries = ledger.entries_in_batch(batch);
        tracing::info!(migrations = entries.len(), batch, "Planned rollback");
        self.transition(ManagerState::Executing);

        let mut report = BatchReport::new(Direction::Down, batch);
        for entry in entries {
            let name = entry.migration_name.clone();
            let Some(descriptor) = descriptors.iter().find(|d| d.name.to_string() == name) else {
                let missing = MigrateError::UnknownMigration { name: name.clone() };
                return Err(self.halt(name, report, missing));
            };

            match self.runner.apply_down(descriptor).await {
                Ok(partial) => {
                    report.completed.push(name);
                    report.partial_rollbacks.extend(partial);
                }
                Err(e) => return Err(self.halt(name, report, e)),
            }
        }

        self.transition(ManagerState::Committed);
        tracing::info!(batch, rolled_back = report.completed.len(), "Rollback committed");
        Ok(PlanOutcome::Executed(report))
    }

    /// Apply one migration in one direction, outside batch planning
    pub async fn run(&mut self, name: &str, direction: Direction) -> MigrateResult<RunReport> {
        self.transition(ManagerState::Planning);
        let planned = async {
            let descriptor = self.store.get(name)?;
            let ledger = self.ledger(direction).await?;
            Ok::<_, MigrateError>((descriptor, ledger))
        }
        .await;
        let (descriptor, ledger) = self.settle(planned)?;
        let is_applied = ledger.entry(name).is_some();

        let mut report = RunReport {
            migration: name.to_string(),
            direction,
            batch: None,
            partial_rollback: None,
        };

        let result = match direction {
            Direction::Up if is_applied => Err(MigrateError::DuplicateLedgerEntry {
                name: name.to_string(),
            }),
            Direction::Down if !is_applied => Err(MigrateError::NotApplied {
                name: name.to_string(),
            }),
            Direction::Up => {
                let batch = ledger.current_batch() + 1;
                self.transition(ManagerState::Executing);
                report.batch = Some(batch);
                self.runner.apply_up(&descriptor, batch).await
            }
            Direction::Down => {
                self.transition(ManagerState::Executing);
                self.runner.apply_down(&descriptor).await.map(|partial| {
                    report.partial_rollback = partial;
                })
            }
        };

        self.settle(result)?;
        self.transition(ManagerState::Committed);
        Ok(report)
    }

    /// Every known migration in order, with its ledger state
    pub async fn status(&self) -> MigrateResult<Vec<StatusRow>> {
        let descriptors = self.store.list()?;
        let ledger = Ledger::read(self.runner.backend()).await?;

        let rows: Vec<StatusRow> = descriptors
            .iter()
            .map(|descriptor| {
                let name = descriptor.name.to_string();
                let status = match ledger.entry(&name) {
                    Some(entry) => MigrationStatus::Applied {
                        applied_at: entry.applied_at,
                        batch: entry.batch,
                    },
                    None => MigrationStatus::Pending,
                };
                StatusRow {
                    name,
                    table_name: descriptor.table_name.clone(),
                    status,
                }
            })
            .collect();

        for entry in ledger.entries() {
            if !rows.iter().any(|row| row.name == entry.migration_name) {
                tracing::warn!(
                    migration = %entry.migration_name,
                    "Ledger entry has no migration file"
                );
            }
        }

        Ok(rows)
    }

    async fn load(&mut self, direction: Direction) -> MigrateResult<(Vec<ChangeDescriptor>, Ledger)> {
        let loaded = async {
            let descriptors = self.store.list()?;
            let ledger = self.ledger(direction).await?;
            Ok::<_, MigrateError>((descriptors, ledger))
        }
        .await;
        self.settle(loaded)
    }

    /// Only applying creates the ledger table; everything else reads
    async fn ledger(&self, direction: Direction) -> MigrateResult<Ledger> {
        match direction {
            Direction::Up => Ledger::load(self.runner.backend()).await,
            Direction::Down => Ledger::read(self.runner.backend()).await,
        }
    }

    /// Move to `Failed` when `result` is an error
    fn settle<T>(&mut self, result: MigrateResult<T>) -> MigrateResult<T> {
        if result.is_err() {
            self.transition(ManagerState::Failed);
        }
        result
    }

    fn halt(&mut self, failed: String, report: BatchReport, source: MigrateError) -> MigrateError {
        self.transition(ManagerState::Failed);
        tracing::error!(
            migration = %failed,
            batch = report.batch,
            completed = ?report.completed,
            error = %source,
            "Batch halted"
        );
        MigrateError::BatchHalted {
            failed,
            report,
            source: Box::new(source),
        }
    }

    fn transition(&mut self, next: ManagerState) {
        tracing::debug!(from = ?self.state, to = ?next, "Manager state");
        self.state = next;
    }
}
