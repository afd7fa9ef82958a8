//! Error types for the migration engine
//!
//! Parsing and validation errors never touch persisted state. Execution
//! errors are contained to the one migration whose unit of work failed.

use std::path::PathBuf;

use thiserror::Error;

use crate::manager::BatchReport;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// Bad `name:type(args)` token
    #[error("Malformed column spec '{token}': {reason}")]
    MalformedColumnSpec { token: String, reason: String },

    /// Bad `add|drop|modify|rename` token
    #[error("Malformed alter operation '{token}': {reason}")]
    MalformedAlterOperation { token: String, reason: String },

    /// Table or ledger name that cannot be spliced into DDL
    #[error("Invalid identifier '{value}': expected [A-Za-z_][A-Za-z0-9_]* and not a reserved word")]
    InvalidIdentifier { value: String },

    #[error("Unknown migration: {name}")]
    UnknownMigration { name: String },

    /// A ledger row already exists for this migration
    #[error("Migration {name} is already recorded in the ledger")]
    DuplicateLedgerEntry { name: String },

    #[error("Migration {name} is not applied")]
    NotApplied { name: String },

    /// A statement failed; the migration's transaction was rolled back
    #[error("Migration {name} failed at statement {statement_index}: {cause}")]
    MigrationExecution {
        name: String,
        statement_index: usize,
        cause: String,
    },

    /// First failure of an `up`/`down` batch, with what completed before it
    #[error("Batch {} halted at {failed} after {} completed migration(s): {source}", .report.batch, .report.completed.len())]
    BatchHalted {
        failed: String,
        report: BatchReport,
        #[source]
        source: Box<MigrateError>,
    },

    /// The batch committed, but regenerating the models afterwards failed
    #[error("Batch {} applied {} migration(s), but model sync failed: {source}", .report.batch, .report.completed.len())]
    SyncFailed {
        report: BatchReport,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("Invalid migration file {}: {reason}", .path.display())]
    InvalidMigrationFile { path: PathBuf, reason: String },

    /// Ledger access or connection failure outside a migration's unit of work
    #[error("Database error: {0}")]
    Database(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MigrateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrateError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed_column(token: &str, reason: impl Into<String>) -> Self {
        MigrateError::MalformedColumnSpec {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_operation(token: &str, reason: impl Into<String>) -> Self {
        MigrateError::MalformedAlterOperation {
            token: token.to_string(),
            reason: reason.into(),
        }
    }

    /// The underlying error, looking through `BatchHalted` and `SyncFailed`
    pub fn root_cause(&self) -> &MigrateError {
        match self {
            MigrateError::BatchHalted { source, .. } | MigrateError::SyncFailed { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::Database(err.to_string())
    }
}
