//! # strata-migrate
//!
//! Ordered, reversible schema changes for PostgreSQL.
//!
//! Migrations are authored from compact column and operation tokens, stored
//! as `.sql` files whose names sort in creation order, and applied in batches
//! recorded in a ledger table inside the target database. Each migration runs
//! in its own transaction together with its ledger write.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_migrate::{MemoryBackend, MigrationManager, MigrationStore, PlanOutcome};
//!
//! # async fn demo() -> strata_migrate::MigrateResult<()> {
//! let store = MigrationStore::new("migrations");
//! store.create_table("users", &["name:varchar(255)", "age:integer"])?;
//!
//! let mut manager = MigrationManager::new(store, Arc::new(MemoryBackend::new()));
//! if let PlanOutcome::Executed(report) = manager.up().await? {
//!     println!("applied {} migration(s) in batch {}", report.completed.len(), report.batch);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod column;
pub mod descriptor;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod mirror;
pub mod name;
pub mod operation;
pub mod runner;
pub mod store;

pub use backends::{MemoryBackend, MigrationBackend, MigrationTransaction, PostgresBackend};
pub use column::{parse_columns, ColumnSpec, SqlType};
pub use descriptor::{ChangeDescriptor, ChangeKind};
pub use error::{MigrateError, MigrateResult};
pub use ledger::{Ledger, LedgerEntry};
pub use manager::{
    BatchReport, Direction, ManagerState, MigrationManager, MigrationStatus, PlanOutcome,
    RunReport, StatusRow,
};
pub use mirror::{replay, MirrorSync, ModelDescriptor, SyncReport};
pub use name::MigrationName;
pub use operation::{parse_operations, AlterOperation, Reversibility};
pub use runner::{MigrationRunner, PartialRollback};
pub use store::MigrationStore;
