//! Model replay - the authored column state of every table
//!
//! Replays descriptors in order from their metadata only; the ledger is not
//! consulted, so the result is the authored schema rather than the applied one.

use std::path::PathBuf;

use serde::Serialize;

use crate::column::ColumnSpec;
use crate::descriptor::{audit_columns, id_column, ChangeDescriptor, ChangeKind};
use crate::error::MigrateResult;
use crate::operation::AlterOperation;

/// Cumulative columns of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

impl ModelDescriptor {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    fn apply(&mut self, operation: &AlterOperation) {
        match operation {
            AlterOperation::Add(column) => match self.position(&column.name) {
                Some(index) => self.columns[index] = column.clone(),
                None => self.columns.push(column.clone()),
            },
            AlterOperation::Drop(column) => match self.position(column) {
                Some(index) => {
                    self.columns.remove(index);
                }
                None => tracing::warn!(
                    table = %self.table_name,
                    column = %column,
                    "Dropped column is unknown to the model"
                ),
            },
            AlterOperation::Modify { column, new_type } => match self.position(column) {
                Some(index) => self.columns[index].sql_type = *new_type,
                None => tracing::warn!(
                    table = %self.table_name,
                    column = %column,
                    "Modified column is unknown to the model"
                ),
            },
            AlterOperation::Rename { from, to } => match self.position(from) {
                Some(index) => self.columns[index].name = to.clone(),
                None => tracing::warn!(
                    table = %self.table_name,
                    column = %from,
                    "Renamed column is unknown to the model"
                ),
            },
        }
    }
}

/// Replay descriptors in order into one model per table, in first-seen order
pub fn replay(descriptors: &[ChangeDescriptor]) -> Vec<ModelDescriptor> {
    let mut models: Vec<ModelDescriptor> = Vec::new();

    for descriptor in descriptors {
        let index = match models
            .iter()
            .position(|model| model.table_name == descriptor.table_name)
        {
            Some(index) => index,
            None => {
                models.push(ModelDescriptor {
                    table_name: descriptor.table_name.clone(),
                    columns: Vec::new(),
                });
                models.len() - 1
            }
        };
        let model = &mut models[index];

        match &descriptor.kind {
            ChangeKind::CreateTable { columns } => {
                let mut all = Vec::with_capacity(columns.len() + 3);
                all.push(id_column());
                all.extend(columns.iter().cloned());
                all.extend(audit_columns());
                model.columns = all;
            }
            ChangeKind::AlterTable { operations } => {
                for operation in operations {
                    model.apply(operation);
                }
            }
        }
    }

    models
}

/// What a sync wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tables: Vec<String>,
    pub written: Vec<PathBuf>,
}

/// Regenerates the data-access mirror from the authored descriptors
pub trait MirrorSync: Send + Sync {
    fn sync(&self, descriptors: &[ChangeDescriptor]) -> MigrateResult<SyncReport>;
}
