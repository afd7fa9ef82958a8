//! Ledger - which migrations are applied, and in which batch

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backends::{MigrationBackend, MigrationTransaction};
use crate::error::{MigrateError, MigrateResult};

/// One applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub migration_name: String,
    pub batch: i32,
    pub applied_at: DateTime<Utc>,
}

/// Snapshot of the ledger table
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    /// Read the ledger, creating its table first if needed
    pub async fn load(backend: &dyn MigrationBackend) -> MigrateResult<Self> {
        backend.ensure_ledger().await?;
        let entries = backend.ledger_entries().await?;
        tracing::debug!(entries = entries.len(), "Loaded ledger");
        Ok(Self::new(entries))
    }

    /// Read the ledger without writing; a missing table reads as empty
    pub async fn read(backend: &dyn MigrationBackend) -> MigrateResult<Self> {
        if !backend.ledger_exists().await? {
            tracing::debug!(backend = %backend.describe(), "No ledger table yet");
            return Ok(Self::default());
        }
        let entries = backend.ledger_entries().await?;
        tracing::debug!(entries = entries.len(), "Read ledger");
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn applied_names(&self) -> HashSet<&str> {
        self.entries
            .iter()
            .map(|entry| entry.migration_name.as_str())
            .collect()
    }

    pub fn entry(&self, migration_name: &str) -> Option<&LedgerEntry> {
        self.entries
            .iter()
            .find(|entry| entry.migration_name == migration_name)
    }

    /// Highest batch number, `0` when nothing is applied
    pub fn current_batch(&self) -> i32 {
        self.entries.iter().map(|entry| entry.batch).max().unwrap_or(0)
    }

    /// Entries of one batch, most recently applied first.
    ///
    /// Ties on `applied_at` fall back to the name, which within one batch
    /// follows apply order.
    pub fn entries_in_batch(&self, batch: i32) -> Vec<&LedgerEntry> {
        let mut entries: Vec<&LedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.batch == batch)
            .collect();
        entries.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| b.migration_name.cmp(&a.migration_name))
        });
        entries
    }

    /// Insert the row for `migration_name` inside the caller's unit of work
    pub async fn record(
        tx: &mut dyn MigrationTransaction,
        migration_name: &str,
        batch: i32,
    ) -> MigrateResult<()> {
        if tx.has_entry(migration_name).await? {
            return Err(MigrateError::DuplicateLedgerEntry {
                name: migration_name.to_string(),
            });
        }
        tx.insert_entry(migration_name, batch, Utc::now()).await
    }

    /// Delete the row for `migration_name` inside the caller's unit of work
    pub async fn erase(tx: &mut dyn MigrationTransaction, migration_name: &str) -> MigrateResult<()> {
        if !tx.delete_entry(migration_name).await? {
            tracing::warn!(migration = migration_name, "No ledger entry to erase");
        }
        Ok(())
    }
}
