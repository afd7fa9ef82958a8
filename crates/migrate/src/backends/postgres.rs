//! PostgreSQL backend over a sqlx pool

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use strata_core::{is_sql_identifier, DatabaseConfig};

use super::{MigrationBackend, MigrationTransaction};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::LedgerEntry;

/// Migrations run one at a time, so a small pool is enough
const MAX_CONNECTIONS: u32 = 2;

pub struct PostgresBackend {
    pool: PgPool,
    table: String,
    target: String,
}

impl PostgresBackend {
    /// Connect using the database section of the configuration
    pub async fn connect(config: &DatabaseConfig, table: &str) -> MigrateResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                MigrateError::Database(format!(
                    "Failed to connect to {}: {}",
                    config.display_target(),
                    e
                ))
            })?;

        tracing::debug!(target_db = %config.display_target(), "Connected to database");
        Self::with_pool(pool, table, config.display_target())
    }

    pub fn with_pool(pool: PgPool, table: &str, target: impl Into<String>) -> MigrateResult<Self> {
        if !is_sql_identifier(table) {
            return Err(MigrateError::InvalidIdentifier {
                value: table.to_string(),
            });
        }
        Ok(Self {
            pool,
            table: table.to_string(),
            target: target.into(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn create_ledger_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                migration_name TEXT UNIQUE NOT NULL,\n    \
                batch INTEGER NOT NULL,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\n\
            )",
            self.table
        )
    }
}

#[async_trait]
impl MigrationBackend for PostgresBackend {
    async fn ensure_ledger(&self) -> MigrateResult<()> {
        sqlx::query(&self.create_ledger_sql())
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(format!("Failed to create ledger table: {}", e)))?;
        Ok(())
    }

    async fn ledger_exists(&self) -> MigrateResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(format!("Failed to look up ledger table: {}", e)))
    }

    async fn ledger_entries(&self) -> MigrateResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT migration_name, batch, applied_at FROM {} ORDER BY batch, applied_at",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Database(format!("Failed to read ledger: {}", e)))?;

        rows.iter()
            .map(|row| -> MigrateResult<LedgerEntry> {
                Ok(LedgerEntry {
                    migration_name: row.try_get("migration_name")?,
                    batch: row.try_get("batch")?,
                    applied_at: row.try_get("applied_at")?,
                })
            })
            .collect()
    }

    async fn begin(&self) -> MigrateResult<Box<dyn MigrationTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrateError::Database(format!("Failed to start transaction: {}", e)))?;
        Ok(Box::new(PostgresTransaction {
            tx,
            table: self.table.clone(),
        }))
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    table: String,
}

#[async_trait]
impl MigrationTransaction for PostgresTransaction {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn has_entry(&mut self, migration_name: &str) -> MigrateResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE migration_name = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(migration_name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_entry(
        &mut self,
        migration_name: &str,
        batch: i32,
        applied_at: DateTime<Utc>,
    ) -> MigrateResult<()> {
        let sql = format!(
            "INSERT INTO {} (migration_name, batch, applied_at) VALUES ($1, $2, $3)",
            self.table
        );
        sqlx::query(&sql)
            .bind(migration_name)
            .bind(batch)
            .bind(applied_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_entry(&mut self, migration_name: &str) -> MigrateResult<bool> {
        let sql = format!("DELETE FROM {} WHERE migration_name = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(migration_name)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        let PostgresTransaction { tx, .. } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        let PostgresTransaction { tx, .. } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
