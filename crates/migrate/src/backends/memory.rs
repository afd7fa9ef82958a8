//! In-memory backend
//!
//! Keeps the ledger and a column-level picture of the schema in process.
//! Statements and ledger writes are staged per transaction and only become
//! visible on commit. Statements matching a configured pattern fail, which
//! lets callers exercise the failure paths without a database.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;

use super::{MigrationBackend, MigrationTransaction};
use crate::error::{MigrateError, MigrateResult};
use crate::ledger::LedgerEntry;

/// Table name to ordered column definitions
pub type MemorySchema = BTreeMap<String, Vec<String>>;

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+)\s*\((.*)\)$").expect("statement pattern is valid")
});
static DROP_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?(\w+)$").expect("statement pattern is valid"));
static ADD_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^ALTER\s+TABLE\s+(\w+)\s+ADD\s+(?:COLUMN\s+)?((\w+)\b.*)$").expect("statement pattern is valid")
});
static DROP_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^ALTER\s+TABLE\s+(\w+)\s+DROP\s+(?:COLUMN\s+)?(\w+)$").expect("statement pattern is valid")
});
static RENAME_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^ALTER\s+TABLE\s+(\w+)\s+RENAME\s+(?:COLUMN\s+)?(\w+)\s+TO\s+(\w+)$").expect("statement pattern is valid")
});
static ALTER_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^ALTER\s+TABLE\s+(\w+)\s+ALTER\s+(?:COLUMN\s+)?(\w+)\s+(?:SET\s+DATA\s+)?TYPE\s+(.+)$")
        .expect("statement pattern is valid")
});

#[derive(Debug, Default)]
struct MemoryState {
    ledger_ready: bool,
    entries: Vec<LedgerEntry>,
    schema: MemorySchema,
    executed: Vec<String>,
    fail_patterns: Vec<String>,
    transactions: usize,
    commits: usize,
    rollbacks: usize,
}

/// Transactional in-process backend
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every statement containing `pattern` (case-insensitive) fail
    pub async fn fail_on(&self, pattern: impl Into<String>) {
        self.state
            .lock()
            .await
            .fail_patterns
            .push(pattern.into().to_lowercase());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.fail_patterns.clear();
    }

    /// Committed statements, in execution order
    pub async fn executed(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    /// Committed schema
    pub async fn schema(&self) -> MemorySchema {
        self.state.lock().await.schema.clone()
    }

    /// Column names of one committed table
    pub async fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.state.lock().await.schema.get(table).map(|definitions| {
            definitions
                .iter()
                .map(|definition| column_name(definition).to_string())
                .collect()
        })
    }

    /// Units of work started so far
    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions
    }

    pub async fn commit_count(&self) -> usize {
        self.state.lock().await.commits
    }

    pub async fn rollback_count(&self) -> usize {
        self.state.lock().await.rollbacks
    }
}

#[async_trait]
impl MigrationBackend for MemoryBackend {
    async fn ensure_ledger(&self) -> MigrateResult<()> {
        self.state.lock().await.ledger_ready = true;
        Ok(())
    }

    async fn ledger_exists(&self) -> MigrateResult<bool> {
        Ok(self.state.lock().await.ledger_ready)
    }

    async fn ledger_entries(&self) -> MigrateResult<Vec<LedgerEntry>> {
        let state = self.state.lock().await;
        if !state.ledger_ready {
            return Err(MigrateError::Database(
                "ledger table does not exist".to_string(),
            ));
        }
        Ok(state.entries.clone())
    }

    async fn begin(&self) -> MigrateResult<Box<dyn MigrationTransaction>> {
        let mut state = self.state.lock().await;
        state.transactions += 1;
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            schema: state.schema.clone(),
            entries: state.entries.clone(),
            executed: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Staged copy of the backend state
struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    schema: MemorySchema,
    entries: Vec<LedgerEntry>,
    executed: Vec<String>,
}

#[async_trait]
impl MigrationTransaction for MemoryTransaction {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        let lowered = sql.to_lowercase();
        let failing = self
            .state
            .lock()
            .await
            .fail_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()));
        if failing {
            return Err(MigrateError::Database(format!(
                "statement rejected: {}",
                sql.lines().next().unwrap_or_default()
            )));
        }

        apply_statement(&mut self.schema, sql).map_err(MigrateError::Database)?;
        self.executed.push(sql.to_string());
        Ok(())
    }

    async fn has_entry(&mut self, migration_name: &str) -> MigrateResult<bool> {
        Ok(self
            .entries
            .iter()
            .any(|entry| entry.migration_name == migration_name))
    }

    async fn insert_entry(
        &mut self,
        migration_name: &str,
        batch: i32,
        applied_at: DateTime<Utc>,
    ) -> MigrateResult<()> {
        if self.has_entry(migration_name).await? {
            return Err(MigrateError::Database(format!(
                "duplicate key value violates unique constraint: {}",
                migration_name
            )));
        }
        self.entries.push(LedgerEntry {
            migration_name: migration_name.to_string(),
            batch,
            applied_at,
        });
        Ok(())
    }

    async fn delete_entry(&mut self, migration_name: &str) -> MigrateResult<bool> {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.migration_name != migration_name);
        Ok(self.entries.len() != before)
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        let MemoryTransaction {
            state,
            schema,
            entries,
            executed,
        } = *self;
        let mut state = state.lock().await;
        state.schema = schema;
        state.entries = entries;
        state.executed.extend(executed);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        self.state.lock().await.rollbacks += 1;
        Ok(())
    }
}

/// Apply one DDL statement to the schema picture.
///
/// Statements that do not touch tables or columns are accepted and ignored.
fn apply_statement(schema: &mut MemorySchema, sql: &str) -> Result<(), String> {
    let sql = sql.trim().trim_end_matches(';').trim();

    if let Some(caps) = CREATE_TABLE.captures(sql) {
        let table = caps[1].to_lowercase();
        if schema.contains_key(&table) {
            return Err(format!("relation \"{}\" already exists", table));
        }
        let columns = split_top_level(&caps[2]).into_iter().map(normalize).collect();
        schema.insert(table, columns);
    } else if let Some(caps) = DROP_TABLE.captures(sql) {
        let table = caps[2].to_lowercase();
        if schema.remove(&table).is_none() && caps.get(1).is_none() {
            return Err(format!("table \"{}\" does not exist", table));
        }
    } else if let Some(caps) = RENAME_COLUMN.captures(sql) {
        let column = find_column(schema, &caps[1], &caps[2])?;
        let definition = &mut column_list(schema, &caps[1])?[column];
        let rest = definition[column_name(definition).len()..].to_string();
        *definition = format!("{}{}", caps[3].to_lowercase(), rest);
    } else if let Some(caps) = ALTER_TYPE.captures(sql) {
        let column = find_column(schema, &caps[1], &caps[2])?;
        let definition = &mut column_list(schema, &caps[1])?[column];
        let nullability = if definition.to_uppercase().ends_with("NOT NULL") {
            " NOT NULL"
        } else {
            ""
        };
        *definition = format!(
            "{} {}{}",
            column_name(definition),
            normalize(&caps[3]),
            nullability
        );
    } else if let Some(caps) = DROP_COLUMN.captures(sql) {
        let column = find_column(schema, &caps[1], &caps[2])?;
        column_list(schema, &caps[1])?.remove(column);
    } else if let Some(caps) = ADD_COLUMN.captures(sql) {
        let name = caps[3].to_lowercase();
        if find_column(schema, &caps[1], &name).is_ok() {
            return Err(format!("column \"{}\" already exists", name));
        }
        let definition = normalize(&caps[2]);
        column_list(schema, &caps[1])?.push(definition);
    }
    Ok(())
}

fn column_list<'a>(schema: &'a mut MemorySchema, table: &str) -> Result<&'a mut Vec<String>, String> {
    schema
        .get_mut(&table.to_lowercase())
        .ok_or_else(|| format!("relation \"{}\" does not exist", table))
}

fn find_column(schema: &mut MemorySchema, table: &str, column: &str) -> Result<usize, String> {
    let column = column.to_lowercase();
    column_list(schema, table)?
        .iter()
        .position(|definition| column_name(definition) == column)
        .ok_or_else(|| format!("column \"{}\" does not exist", column))
}

fn column_name(definition: &str) -> &str {
    definition.split_whitespace().next().unwrap_or_default()
}

/// Collapse whitespace, lowercase the column name
fn normalize(definition: &str) -> String {
    let mut words = definition.split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    std::iter::once(name)
        .chain(words.map(str::to_string))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a column list on commas outside parentheses
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts.into_iter().filter(|part| !part.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_staged_until_commit() {
        let backend = MemoryBackend::new();
        backend.ensure_ledger().await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        tx.execute("CREATE TABLE users (id SERIAL PRIMARY KEY, price DECIMAL(10,2))")
            .await
            .unwrap();
        tx.insert_entry("m_1_a", 1, Utc::now()).await.unwrap();
        assert!(backend.schema().await.is_empty());
        assert!(backend.ledger_entries().await.unwrap().is_empty());
        tx.commit().await.unwrap();

        assert_eq!(
            backend.columns("users").await,
            Some(vec!["id".to_string(), "price".to_string()])
        );
        assert_eq!(backend.ledger_entries().await.unwrap().len(), 1);
        assert_eq!(backend.executed().await.len(), 1);
        assert_eq!(backend.commit_count().await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let backend = MemoryBackend::new();

        let mut tx = backend.begin().await.unwrap();
        tx.execute("CREATE TABLE users (id SERIAL)").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(backend.schema().await.is_empty());
        assert!(backend.executed().await.is_empty());
        assert_eq!(backend.rollback_count().await, 1);
    }

    #[tokio::test]
    async fn test_fail_patterns() {
        let backend = MemoryBackend::new();
        backend.fail_on("broken").await;

        let mut tx = backend.begin().await.unwrap();
        let err = tx.execute("CREATE TABLE broken (id SERIAL)").await.unwrap_err();
        assert!(matches!(err, MigrateError::Database(_)));

        backend.clear_failures().await;
        tx.execute("CREATE TABLE broken (id SERIAL)").await.unwrap();
    }

    #[test]
    fn test_alter_statements() {
        let mut schema = MemorySchema::new();
        apply_statement(
            &mut schema,
            "CREATE TABLE users (\n    id SERIAL PRIMARY KEY,\n    name VARCHAR(255)\n)",
        )
        .unwrap();
        apply_statement(&mut schema, "ALTER TABLE users ADD COLUMN age INTEGER NOT NULL").unwrap();
        apply_statement(&mut schema, "ALTER TABLE users RENAME COLUMN name TO full_name").unwrap();
        apply_statement(&mut schema, "ALTER TABLE users ALTER COLUMN age TYPE BIGINT").unwrap();

        assert_eq!(
            schema["users"],
            vec!["id SERIAL PRIMARY KEY", "full_name VARCHAR(255)", "age BIGINT NOT NULL"]
        );

        apply_statement(&mut schema, "ALTER TABLE users DROP COLUMN age").unwrap();
        assert_eq!(schema["users"].len(), 2);

        assert!(apply_statement(&mut schema, "ALTER TABLE users DROP COLUMN age").is_err());
        assert!(apply_statement(&mut schema, "ALTER TABLE users ADD COLUMN id INTEGER").is_err());
        assert!(apply_statement(&mut schema, "CREATE TABLE users (id SERIAL)").is_err());

        apply_statement(&mut schema, "DROP TABLE IF EXISTS users;").unwrap();
        apply_statement(&mut schema, "DROP TABLE IF EXISTS users").unwrap();
        assert!(apply_statement(&mut schema, "DROP TABLE users").is_err());
        assert!(schema.is_empty());
    }
}
