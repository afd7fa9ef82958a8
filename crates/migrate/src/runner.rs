//! Migration Runner - applies or reverts one migration in one transaction

use std::sync::Arc;

use serde::Serialize;

use crate::backends::{MigrationBackend, MigrationTransaction};
use crate::descriptor::{is_manual_placeholder, ChangeDescriptor};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::Ledger;

/// A down that left operations unreversed. A warning, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialRollback {
    pub migration: String,
    pub unreversed: Vec<String>,
}

/// Runs a single migration against a backend
#[derive(Clone)]
pub struct MigrationRunner {
    backend: Arc<dyn MigrationBackend>,
}

impl MigrationRunner {
    pub fn new(backend: Arc<dyn MigrationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn MigrationBackend {
        self.backend.as_ref()
    }

    /// Run the up statements and record the migration under `batch`.
    ///
    /// Statements and the ledger row share one transaction; on any failure
    /// it is rolled back and the ledger is left untouched.
    pub async fn apply_up(&self, descriptor: &ChangeDescriptor, batch: i32) -> MigrateResult<()> {
        let name = descriptor.name.to_string();
        tracing::info!(migration = %name, batch, "Applying migration");

        let mut tx = self.backend.begin().await?;
        let result = async {
            run_statements(tx.as_mut(), &name, &descriptor.up_statements).await?;
            Ledger::record(tx.as_mut(), &name, batch).await
        }
        .await;

        finish(tx, result).await?;
        tracing::info!(migration = %name, batch, "Applied migration");
        Ok(())
    }

    /// Run the down statements and erase the migration's ledger row.
    ///
    /// `-- manual:` placeholders are skipped; when any remain the rollback
    /// still succeeds and reports what was left unreversed.
    pub async fn apply_down(
        &self,
        descriptor: &ChangeDescriptor,
    ) -> MigrateResult<Option<PartialRollback>> {
        let name = descriptor.name.to_string();
        tracing::info!(migration = %name, "Rolling back migration");

        let mut tx = self.backend.begin().await?;
        let result = async {
            run_statements(tx.as_mut(), &name, &descriptor.down_statements).await?;
            Ledger::erase(tx.as_mut(), &name).await
        }
        .await;

        finish(tx, result).await?;
        tracing::info!(migration = %name, "Rolled back migration");

        if descriptor.is_down_complete() {
            return Ok(None);
        }
        tracing::warn!(
            migration = %name,
            unreversed = ?descriptor.unreversed,
            "Rollback left operations unreversed; revert them by hand"
        );
        Ok(Some(PartialRollback {
            migration: name,
            unreversed: descriptor.unreversed.clone(),
        }))
    }
}

async fn run_statements(
    tx: &mut dyn MigrationTransaction,
    name: &str,
    statements: &[String],
) -> MigrateResult<()> {
    for (index, statement) in statements.iter().enumerate() {
        if is_manual_placeholder(statement) || statement.trim().is_empty() {
            continue;
        }
        tracing::debug!(migration = name, index, sql = %statement, "Executing statement");
        tx.execute(statement).await.map_err(|e| MigrateError::MigrationExecution {
            name: name.to_string(),
            statement_index: index,
            cause: match e {
                MigrateError::Database(message) => message,
                other => other.to_string(),
            },
        })?;
    }
    Ok(())
}

/// Commit on success, roll back on failure
async fn finish(tx: Box<dyn MigrationTransaction>, result: MigrateResult<()>) -> MigrateResult<()> {
    match result {
        Ok(()) => tx.commit().await,
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::column::parse_columns;
    use crate::name::MigrationName;
    use crate::operation::parse_operations;

    fn create_users() -> ChangeDescriptor {
        let name = MigrationName::new(1, "create_users").unwrap();
        let columns = parse_columns(&["name", "age:integer"]).unwrap();
        ChangeDescriptor::create_table(name, "users", columns).unwrap()
    }

    fn runner(backend: &MemoryBackend) -> MigrationRunner {
        MigrationRunner::new(Arc::new(backend.clone()))
    }

    #[tokio::test]
    async fn test_apply_up_records_the_migration() {
        let backend = MemoryBackend::new();
        runner(&backend).apply_up(&create_users(), 1).await.unwrap();

        let ledger = Ledger::load(&backend).await.unwrap();
        assert_eq!(ledger.current_batch(), 1);
        assert!(ledger.applied_names().contains("m_0000000000000001_create_users"));
        assert!(backend.columns("users").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_statement_leaves_ledger_alone() {
        let backend = MemoryBackend::new();
        backend.fail_on("create table users").await;

        let err = runner(&backend).apply_up(&create_users(), 1).await.unwrap_err();
        match err {
            MigrateError::MigrationExecution {
                name,
                statement_index,
                cause,
            } => {
                assert_eq!(name, "m_0000000000000001_create_users");
                assert_eq!(statement_index, 0);
                assert!(cause.contains("statement rejected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(Ledger::load(&backend).await.unwrap().entries().is_empty());
        assert!(backend.schema().await.is_empty());
        assert_eq!(backend.rollback_count().await, 1);
    }

    #[tokio::test]
    async fn test_partial_rollback_still_erases_entry() {
        let backend = MemoryBackend::new();
        let runner = runner(&backend);
        runner.apply_up(&create_users(), 1).await.unwrap();

        let name = MigrationName::new(2, "alter_users").unwrap();
        let ops = parse_operations(&["add nickname:text", "drop age"]).unwrap();
        let alter = ChangeDescriptor::alter_table(name, "users", ops).unwrap();
        runner.apply_up(&alter, 2).await.unwrap();
        assert_eq!(
            backend.columns("users").await.unwrap(),
            vec!["id", "name", "created_at", "updated_at", "nickname"]
        );

        let partial = runner.apply_down(&alter).await.unwrap();
        assert_eq!(
            partial,
            Some(PartialRollback {
                migration: "m_0000000000000002_alter_users".to_string(),
                unreversed: vec!["drop age".to_string()],
            })
        );
        assert_eq!(
            backend.columns("users").await.unwrap(),
            vec!["id", "name", "created_at", "updated_at"]
        );
        let ledger = Ledger::load(&backend).await.unwrap();
        assert_eq!(ledger.current_batch(), 1);
    }

    #[tokio::test]
    async fn test_complete_rollback() {
        let backend = MemoryBackend::new();
        let runner = runner(&backend);
        let create = create_users();
        runner.apply_up(&create, 1).await.unwrap();

        assert_eq!(runner.apply_down(&create).await.unwrap(), None);
        assert!(backend.schema().await.is_empty());
        assert!(Ledger::load(&backend).await.unwrap().entries().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_record_rolls_back_statements() {
        let backend = MemoryBackend::new();
        let runner = runner(&backend);
        let noop = ChangeDescriptor {
            up_statements: vec!["SELECT 1".to_string()],
            ..create_users()
        };
        runner.apply_up(&noop, 1).await.unwrap();

        let err = runner.apply_up(&create_users(), 2).await.unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateLedgerEntry { .. }));
        assert!(backend.schema().await.is_empty());
    }
}
