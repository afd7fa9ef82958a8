//! Alter-table operations and their reversibility
//!
//! `Add` and `Rename` carry everything needed to undo them. `Drop` and
//! `Modify` lose the previous column definition, so their rollback has to be
//! written by hand.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::{is_reserved_word, is_sql_identifier};

use crate::column::{ColumnSpec, SqlType};
use crate::error::{MigrateError, MigrateResult};

/// Whether an operation's inverse can be derived from the operation alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reversibility {
    Automatic,
    Manual,
}

/// One step of an alter-table migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlterOperation {
    Add(ColumnSpec),
    Drop(String),
    Modify { column: String, new_type: SqlType },
    Rename { from: String, to: String },
}

impl AlterOperation {
    /// Parse a verb and its argument, e.g. `("rename", "old:new")`
    pub fn parse(verb: &str, argument: &str) -> MigrateResult<Self> {
        let token = format!("{} {}", verb, argument);
        match verb.to_lowercase().as_str() {
            "add" => {
                let column = ColumnSpec::parse(argument)
                    .map_err(|e| MigrateError::malformed_operation(&token, e.to_string()))?;
                Ok(AlterOperation::Add(column))
            }
            "drop" => {
                let column = column_name(&token, argument.trim())?;
                Ok(AlterOperation::Drop(column))
            }
            "modify" => {
                let (column, type_expr) = argument.split_once(':').ok_or_else(|| {
                    MigrateError::malformed_operation(&token, "modify needs column:new_type")
                })?;
                let column = column_name(&token, column.trim())?;
                let new_type = SqlType::parse(type_expr)
                    .map_err(|reason| MigrateError::malformed_operation(&token, reason))?;
                Ok(AlterOperation::Modify { column, new_type })
            }
            "rename" => {
                let (from, to) = argument.split_once(':').ok_or_else(|| {
                    MigrateError::malformed_operation(&token, "rename needs old_name:new_name")
                })?;
                let from = column_name(&token, from.trim())?;
                let to = column_name(&token, to.trim())?;
                if from == to {
                    return Err(MigrateError::malformed_operation(
                        &token,
                        "old and new names are the same",
                    ));
                }
                Ok(AlterOperation::Rename { from, to })
            }
            _ => Err(MigrateError::malformed_operation(
                &token,
                "unknown operation (expected add, drop, modify or rename)",
            )),
        }
    }

    pub fn reversibility(&self) -> Reversibility {
        match self {
            AlterOperation::Add(_) | AlterOperation::Rename { .. } => Reversibility::Automatic,
            AlterOperation::Drop(_) | AlterOperation::Modify { .. } => Reversibility::Manual,
        }
    }

    /// The mechanical inverse, when one exists
    pub fn inverse(&self) -> Option<AlterOperation> {
        match self {
            AlterOperation::Add(column) => Some(AlterOperation::Drop(column.name.clone())),
            AlterOperation::Rename { from, to } => Some(AlterOperation::Rename {
                from: to.clone(),
                to: from.clone(),
            }),
            AlterOperation::Drop(_) | AlterOperation::Modify { .. } => None,
        }
    }

    /// The column this operation touches (the old name for renames)
    pub fn column(&self) -> &str {
        match self {
            AlterOperation::Add(column) => &column.name,
            AlterOperation::Drop(column) => column,
            AlterOperation::Modify { column, .. } => column,
            AlterOperation::Rename { from, .. } => from,
        }
    }

    pub fn to_sql(&self, table: &str) -> String {
        match self {
            AlterOperation::Add(column) => {
                format!("ALTER TABLE {} ADD COLUMN {}", table, column.definition())
            }
            AlterOperation::Drop(column) => format!("ALTER TABLE {} DROP COLUMN {}", table, column),
            AlterOperation::Modify { column, new_type } => format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                table,
                column,
                new_type.sql()
            ),
            AlterOperation::Rename { from, to } => {
                format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, from, to)
            }
        }
    }
}

impl fmt::Display for AlterOperation {
    /// Token form, the inverse of [`parse_operations`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlterOperation::Add(column) => write!(f, "add {}", column),
            AlterOperation::Drop(column) => write!(f, "drop {}", column),
            AlterOperation::Modify { column, new_type } => {
                write!(f, "modify {}:{}", column, new_type)
            }
            AlterOperation::Rename { from, to } => write!(f, "rename {}:{}", from, to),
        }
    }
}

fn column_name(token: &str, name: &str) -> MigrateResult<String> {
    if !is_sql_identifier(name) {
        return Err(MigrateError::malformed_operation(
            token,
            format!("'{}' is not a valid column name", name),
        ));
    }
    if is_reserved_word(name) {
        return Err(MigrateError::malformed_operation(
            token,
            format!("'{}' is a reserved word", name),
        ));
    }
    Ok(name.to_lowercase())
}

/// Parse `verb argument` pairs, e.g. `add age:integer drop legacy_id`.
///
/// Tokens may arrive one word per argument (shell) or with verb and argument
/// joined by whitespace; both are split on whitespace first.
pub fn parse_operations<S: AsRef<str>>(tokens: &[S]) -> MigrateResult<Vec<AlterOperation>> {
    let words: Vec<&str> = tokens
        .iter()
        .flat_map(|token| token.as_ref().split_whitespace())
        .collect();

    let mut operations = Vec::new();
    let mut index = 0;
    while index < words.len() {
        let verb = words[index];
        if !matches!(
            verb.to_lowercase().as_str(),
            "add" | "drop" | "modify" | "rename"
        ) {
            return Err(MigrateError::malformed_operation(
                verb,
                "unknown operation (expected add, drop, modify or rename)",
            ));
        }
        let argument = words
            .get(index + 1)
            .ok_or_else(|| MigrateError::malformed_operation(verb, "missing argument"))?;
        operations.push(AlterOperation::parse(verb, argument)?);
        index += 2;
    }

    Ok(operations)
}
