//! Database backends for the ledger and migration execution
//!
//! A backend hands out units of work; each migration's statements and its
//! ledger write share one [`MigrationTransaction`], so either both land or
//! neither does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MigrateResult;
use crate::ledger::LedgerEntry;

pub mod memory;
pub mod postgres;

pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

/// A database that can hold a ledger and run migrations
#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// Create the ledger table when it does not exist yet
    async fn ensure_ledger(&self) -> MigrateResult<()>;

    /// Whether the ledger table exists; never creates it
    async fn ledger_exists(&self) -> MigrateResult<bool>;

    /// Every ledger row, in no particular order
    async fn ledger_entries(&self) -> MigrateResult<Vec<LedgerEntry>>;

    /// Start a unit of work
    async fn begin(&self) -> MigrateResult<Box<dyn MigrationTransaction>>;

    /// Human readable target, for logs
    fn describe(&self) -> String;
}

/// One unit of work. Dropping it without `commit` discards everything.
#[async_trait]
pub trait MigrationTransaction: Send {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()>;

    async fn has_entry(&mut self, migration_name: &str) -> MigrateResult<bool>;

    async fn insert_entry(
        &mut self,
        migration_name: &str,
        batch: i32,
        applied_at: DateTime<Utc>,
    ) -> MigrateResult<()>;

    /// Returns whether a row was removed
    async fn delete_entry(&mut self, migration_name: &str) -> MigrateResult<bool>;

    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}
