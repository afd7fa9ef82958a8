//! End-to-end migration lifecycle against the in-memory backend

use std::sync::{Arc, Mutex};

use strata_migrate::{
    replay, ChangeDescriptor, ManagerState, MemoryBackend, MigrateError, MigrateResult,
    MigrationManager, MigrationStatus, MigrationStore, MirrorSync, ModelDescriptor,
    PartialRollback, PlanOutcome, SyncReport,
};
use strata_migrate::{Direction, Ledger, MigrationBackend};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: MigrationStore,
    backend: MemoryBackend,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = MigrationStore::new(dir.path().join("migrations"));
        Self {
            _dir: dir,
            store,
            backend: MemoryBackend::new(),
        }
    }

    fn manager(&self) -> MigrationManager {
        MigrationManager::new(self.store.clone(), Arc::new(self.backend.clone()))
    }

    fn create(&self, table: &str, columns: &[&str]) -> String {
        let (descriptor, _) = self.store.create_table(table, columns).unwrap();
        descriptor.name.to_string()
    }

    fn alter(&self, table: &str, operations: &[&str]) -> String {
        let (descriptor, _) = self.store.alter_table(table, operations).unwrap();
        descriptor.name.to_string()
    }
}

#[derive(Clone, Default)]
struct RecordingMirror {
    models: Arc<Mutex<Vec<ModelDescriptor>>>,
}

impl MirrorSync for RecordingMirror {
    fn sync(&self, descriptors: &[ChangeDescriptor]) -> MigrateResult<SyncReport> {
        let models = replay(descriptors);
        let tables = models.iter().map(|m| m.table_name.clone()).collect();
        *self.models.lock().unwrap() = models;
        Ok(SyncReport {
            tables,
            written: Vec::new(),
        })
    }
}

struct FailingMirror;

impl MirrorSync for FailingMirror {
    fn sync(&self, _descriptors: &[ChangeDescriptor]) -> MigrateResult<SyncReport> {
        Err(MigrateError::Template("models folder is read-only".to_string()))
    }
}

fn executed(outcome: PlanOutcome) -> strata_migrate::BatchReport {
    match outcome {
        PlanOutcome::Executed(report) => report,
        PlanOutcome::NothingToDo => panic!("expected the plan to execute"),
    }
}

fn batch_of(status: &MigrationStatus) -> Option<i32> {
    match status {
        MigrationStatus::Applied { batch, .. } => Some(*batch),
        MigrationStatus::Pending => None,
    }
}

#[tokio::test]
async fn status_tracks_batches_across_runs() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.create("users", &["name:varchar(255)"]);
    fx.create("posts", &["title:text"]);

    let before = manager.status().await.unwrap();
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|row| row.status == MigrationStatus::Pending));

    executed(manager.up().await.unwrap());
    let after = manager.status().await.unwrap();
    assert!(after.iter().all(|row| batch_of(&row.status) == Some(1)));

    let comments = fx.create("comments", &["body:text"]);
    let report = executed(manager.up().await.unwrap());
    assert_eq!(report.batch, 2);
    assert_eq!(report.completed, vec![comments.clone()]);

    let rows = manager.status().await.unwrap();
    let row = rows.iter().find(|row| row.name == comments).unwrap();
    assert_eq!(batch_of(&row.status), Some(2));
    assert_eq!(row.table_name, "comments");
    assert_eq!(manager.state(), ManagerState::Committed);
}

#[tokio::test]
async fn up_with_nothing_pending_is_not_an_error() {
    let fx = Fixture::new();
    let mut manager = fx.manager();

    assert_eq!(manager.up().await.unwrap(), PlanOutcome::NothingToDo);
    assert_eq!(manager.state(), ManagerState::Idle);

    fx.create("users", &["name"]);
    executed(manager.up().await.unwrap());
    assert_eq!(manager.up().await.unwrap(), PlanOutcome::NothingToDo);
}

#[tokio::test]
async fn failure_halts_the_batch_at_the_failing_migration() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    let alpha = fx.create("alpha", &["name"]);
    let beta = fx.create("beta", &["name"]);
    fx.create("gamma", &["name"]);
    fx.backend.fail_on("create table beta").await;

    let err = manager.up().await.unwrap_err();
    match &err {
        MigrateError::BatchHalted {
            failed, report, ..
        } => {
            assert_eq!(failed, &beta);
            assert_eq!(report.batch, 1);
            assert_eq!(report.completed, vec![alpha.clone()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        err.root_cause(),
        MigrateError::MigrationExecution { statement_index: 0, .. }
    ));
    assert_eq!(manager.state(), ManagerState::Failed);

    let ledger = Ledger::load(&fx.backend).await.unwrap();
    assert_eq!(ledger.entries().len(), 1);
    assert!(ledger.applied_names().contains(alpha.as_str()));

    // gamma was never attempted
    assert!(fx.backend.columns("gamma").await.is_none());
    assert!(!fx
        .backend
        .executed()
        .await
        .iter()
        .any(|sql| sql.to_lowercase().contains("gamma")));
    assert_eq!(fx.backend.transaction_count().await, 2);
}

#[tokio::test]
async fn down_with_empty_ledger_does_nothing() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.create("users", &["name"]);

    assert_eq!(manager.down().await.unwrap(), PlanOutcome::NothingToDo);
    assert_eq!(manager.state(), ManagerState::Idle);
    assert_eq!(fx.backend.transaction_count().await, 0);
    assert!(fx.backend.executed().await.is_empty());
}

#[tokio::test]
async fn read_paths_leave_a_fresh_database_untouched() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    let users = fx.create("users", &["name"]);

    let rows = manager.status().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_applied());
    assert_eq!(manager.down().await.unwrap(), PlanOutcome::NothingToDo);
    assert!(matches!(
        manager.run(&users, Direction::Down).await,
        Err(MigrateError::NotApplied { .. })
    ));

    assert!(!fx.backend.ledger_exists().await.unwrap());
    assert_eq!(fx.backend.transaction_count().await, 0);
    assert!(fx.backend.executed().await.is_empty());

    executed(manager.up().await.unwrap());
    assert!(fx.backend.ledger_exists().await.unwrap());
}

#[tokio::test]
async fn sync_failure_after_commit_still_reports_the_batch() {
    let fx = Fixture::new();
    let mut manager = fx.manager().with_mirror(Box::new(FailingMirror));
    let users = fx.create("users", &["name"]);

    let err = manager.up().await.unwrap_err();
    match &err {
        MigrateError::SyncFailed { report, .. } => {
            assert_eq!(report.batch, 1);
            assert_eq!(report.completed, vec![users.clone()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(err.root_cause(), MigrateError::Template(_)));
    assert_eq!(manager.state(), ManagerState::Committed);

    let ledger = Ledger::read(&fx.backend).await.unwrap();
    assert!(ledger.entry(&users).is_some());
}

#[tokio::test]
async fn users_example_mirrors_all_columns() {
    let fx = Fixture::new();
    let mirror = RecordingMirror::default();
    let mut manager = fx.manager().with_mirror(Box::new(mirror.clone()));
    let users = fx.create("users", &["name:varchar(255)", "age:integer"]);

    executed(manager.up().await.unwrap());

    let rows = manager.status().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, users);
    assert_eq!(batch_of(&rows[0].status), Some(1));

    let models = mirror.models.lock().unwrap().clone();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].table_name, "users");
    assert_eq!(
        models[0].column_names(),
        vec!["id", "name", "age", "created_at", "updated_at"]
    );
}

#[tokio::test]
async fn dropping_a_column_rolls_back_partially() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.create("users", &["name:varchar(255)", "age:integer"]);
    executed(manager.up().await.unwrap());

    let alter = fx.alter("users", &["drop", "age"]);
    executed(manager.up().await.unwrap());
    assert_eq!(
        fx.backend.columns("users").await.unwrap(),
        vec!["id", "name", "created_at", "updated_at"]
    );

    let report = executed(manager.down().await.unwrap());
    assert_eq!(report.batch, 2);
    assert_eq!(report.completed, vec![alter.clone()]);
    assert_eq!(
        report.partial_rollbacks,
        vec![PartialRollback {
            migration: alter.clone(),
            unreversed: vec!["drop age".to_string()],
        }]
    );

    let ledger = Ledger::load(&fx.backend).await.unwrap();
    assert!(ledger.entry(&alter).is_none());
    assert_eq!(ledger.current_batch(), 1);
}

#[tokio::test]
async fn automatic_operations_round_trip() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.create("users", &["name:varchar(255)", "age:integer"]);
    executed(manager.up().await.unwrap());
    let after_first_up = fx.backend.schema().await;

    fx.alter("users", &["add", "nickname:text"]);
    fx.alter("users", &["rename", "name:full_name"]);
    let report = executed(manager.up().await.unwrap());
    assert_eq!(report.completed.len(), 2);
    let after_second_up = fx.backend.schema().await;
    assert_ne!(after_first_up, after_second_up);

    let report = executed(manager.down().await.unwrap());
    assert_eq!(report.completed.len(), 2);
    assert!(report.partial_rollbacks.is_empty());
    assert_eq!(fx.backend.schema().await, after_first_up);

    executed(manager.up().await.unwrap());
    assert_eq!(fx.backend.schema().await, after_second_up);
}

#[tokio::test]
async fn down_rolls_back_newest_first_and_halts_on_failure() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    let alpha = fx.create("alpha", &["name"]);
    let beta = fx.create("beta", &["name"]);
    executed(manager.up().await.unwrap());

    fx.backend.fail_on("drop table if exists beta").await;
    let err = manager.down().await.unwrap_err();
    match err {
        MigrateError::BatchHalted { failed, report, .. } => {
            assert_eq!(failed, beta);
            assert!(report.completed.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(Ledger::load(&fx.backend).await.unwrap().entries().len(), 2);

    fx.backend.clear_failures().await;
    let report = executed(manager.down().await.unwrap());
    assert_eq!(report.completed, vec![beta, alpha]);
    assert!(fx.backend.schema().await.is_empty());
}

#[tokio::test]
async fn targeted_runs_check_the_ledger() {
    let fx = Fixture::new();
    let mut manager = fx.manager();
    fx.create("users", &["name"]);
    executed(manager.up().await.unwrap());
    let posts = fx.create("posts", &["title"]);

    let report = manager.run(&posts, Direction::Up).await.unwrap();
    assert_eq!(report.batch, Some(2));
    assert!(matches!(
        manager.run(&posts, Direction::Up).await,
        Err(MigrateError::DuplicateLedgerEntry { .. })
    ));
    assert_eq!(manager.state(), ManagerState::Failed);

    let report = manager.run(&posts, Direction::Down).await.unwrap();
    assert_eq!(report.batch, None);
    assert_eq!(report.partial_rollback, None);
    assert!(fx.backend.columns("posts").await.is_none());
    assert!(matches!(
        manager.run(&posts, Direction::Down).await,
        Err(MigrateError::NotApplied { .. })
    ));
    assert!(matches!(
        manager.run("m_0000000000000001_create_nothing", Direction::Up).await,
        Err(MigrateError::UnknownMigration { .. })
    ));
}
