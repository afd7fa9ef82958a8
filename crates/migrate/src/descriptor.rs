//! Change Descriptor - one migration's forward and backward statements
//!
//! Both shapes (create table, alter table) are plain data built by the two
//! constructors below; nothing about a migration is dynamic.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strata_core::{is_reserved_word, is_sql_identifier};

use crate::column::{ColumnSpec, SqlType};
use crate::error::{MigrateError, MigrateResult};
use crate::name::MigrationName;
use crate::operation::{AlterOperation, Reversibility};

/// Implicit auto-incrementing primary key of every created table
pub const ID_COLUMN: &str = "id";
/// Implicit audit columns appended to every created table
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Prefix of the down-section placeholder for an operation that must be reversed by hand
pub const MANUAL_MARKER: &str = "-- manual:";

/// What the migration does, as authored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    CreateTable { columns: Vec<ColumnSpec> },
    AlterTable { operations: Vec<AlterOperation> },
}

/// One migration: identity, target table and the SQL for both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDescriptor {
    pub name: MigrationName,
    pub table_name: String,
    pub kind: ChangeKind,
    pub up_statements: Vec<String>,
    /// May contain `-- manual:` placeholders, which are never executed
    pub down_statements: Vec<String>,
    /// Operations the down statements leave unreversed, in token form
    pub unreversed: Vec<String>,
}

impl ChangeDescriptor {
    /// Build a create-table migration.
    ///
    /// The table gets an `id` primary key first, the given columns in order,
    /// then `created_at` and `updated_at`.
    pub fn create_table(
        name: MigrationName,
        table_name: &str,
        columns: Vec<ColumnSpec>,
    ) -> MigrateResult<Self> {
        let table_name = table_identifier(table_name)?;

        let mut seen: HashSet<&str> = [ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN]
            .into_iter()
            .collect();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(MigrateError::malformed_column(
                    &column.to_string(),
                    format!("column '{}' is declared twice or is implicit", column.name),
                ));
            }
        }

        let mut definitions = Vec::with_capacity(columns.len() + 3);
        definitions.push(format!("{} SERIAL PRIMARY KEY", ID_COLUMN));
        definitions.extend(columns.iter().map(ColumnSpec::definition));
        definitions.push(format!(
            "{} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
            CREATED_AT_COLUMN
        ));
        definitions.push(format!(
            "{} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
            UPDATED_AT_COLUMN
        ));

        let up = format!(
            "CREATE TABLE {} (\n    {}\n)",
            table_name,
            definitions.join(",\n    ")
        );
        let down = format!("DROP TABLE IF EXISTS {}", table_name);

        Ok(Self {
            name,
            table_name,
            kind: ChangeKind::CreateTable { columns },
            up_statements: vec![up],
            down_statements: vec![down],
            unreversed: Vec::new(),
        })
    }

    /// Build an alter-table migration.
    ///
    /// Down statements undo the operations in reverse order, since later
    /// operations may depend on the schema left by earlier ones. Operations
    /// without a mechanical inverse get a `-- manual:` placeholder and are
    /// listed in `unreversed`.
    pub fn alter_table(
        name: MigrationName,
        table_name: &str,
        operations: Vec<AlterOperation>,
    ) -> MigrateResult<Self> {
        let table_name = table_identifier(table_name)?;
        if operations.is_empty() {
            return Err(MigrateError::malformed_operation(
                &table_name,
                "an alter migration needs at least one operation",
            ));
        }

        let up_statements = operations.iter().map(|op| op.to_sql(&table_name)).collect();

        let mut down_statements = Vec::with_capacity(operations.len());
        let mut unreversed = Vec::new();
        for op in operations.iter().rev() {
            match op.inverse() {
                Some(inverse) => down_statements.push(inverse.to_sql(&table_name)),
                None => {
                    down_statements.push(format!("{} {}", MANUAL_MARKER, op));
                    unreversed.push(op.to_string());
                }
            }
        }

        Ok(Self {
            name,
            table_name,
            kind: ChangeKind::AlterTable { operations },
            up_statements,
            down_statements,
            unreversed,
        })
    }

    /// Columns of a create-table migration
    pub fn columns(&self) -> Option<&[ColumnSpec]> {
        match &self.kind {
            ChangeKind::CreateTable { columns } => Some(columns),
            ChangeKind::AlterTable { .. } => None,
        }
    }

    pub fn operations(&self) -> Option<&[AlterOperation]> {
        match &self.kind {
            ChangeKind::AlterTable { operations } => Some(operations),
            ChangeKind::CreateTable { .. } => None,
        }
    }

    /// Whether every operation has a down statement that can actually run
    pub fn is_down_complete(&self) -> bool {
        self.unreversed.is_empty()
    }

    /// Operations flagged `Manual`, regardless of whether a hand-written down exists
    pub fn manual_operations(&self) -> Vec<&AlterOperation> {
        self.operations()
            .map(|ops| {
                ops.iter()
                    .filter(|op| op.reversibility() == Reversibility::Manual)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Whether a down statement is a placeholder rather than SQL
pub fn is_manual_placeholder(statement: &str) -> bool {
    statement.trim_start().starts_with(MANUAL_MARKER)
}

/// The implicit primary key as a column, for model replay
pub fn id_column() -> ColumnSpec {
    ColumnSpec::new(ID_COLUMN, SqlType::Integer).not_null()
}

/// The implicit audit columns, for model replay
pub fn audit_columns() -> [ColumnSpec; 2] {
    [
        ColumnSpec::new(CREATED_AT_COLUMN, SqlType::Timestamp).not_null(),
        ColumnSpec::new(UPDATED_AT_COLUMN, SqlType::Timestamp).not_null(),
    ]
}

/// Validate a table name and fold it to the case PostgreSQL stores
pub(crate) fn table_identifier(table_name: &str) -> MigrateResult<String> {
    if is_sql_identifier(table_name) && !is_reserved_word(table_name) {
        Ok(table_name.to_lowercase())
    } else {
        Err(MigrateError::InvalidIdentifier {
            value: table_name.to_string(),
        })
    }
}
