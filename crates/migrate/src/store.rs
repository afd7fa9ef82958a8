//! Migration File Store - migration files on disk
//!
//! Each migration is one `<name>.sql` file. A comment header records how the
//! descriptor was authored, followed by `-- Up migration` and
//! `-- Down migration` sections holding the statements.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use strata_core::MigrationsConfig;

use crate::column::parse_columns;
use crate::descriptor::{
    is_manual_placeholder, table_identifier, ChangeDescriptor, ChangeKind, MANUAL_MARKER,
};
use crate::error::{MigrateError, MigrateResult};
use crate::name::MigrationName;
use crate::operation::parse_operations;

const EXTENSION: &str = "sql";
const UP_SECTION: &str = "-- up migration";
const DOWN_SECTION: &str = "-- down migration";

/// Reads and writes migration files in one folder
#[derive(Debug, Clone)]
pub struct MigrationStore {
    folder: PathBuf,
}

impl MigrationStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn from_config(config: &MigrationsConfig) -> Self {
        Self::new(&config.folder)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Every migration, ordered by ordinal. A missing folder holds no migrations.
    pub fn list(&self) -> MigrateResult<Vec<ChangeDescriptor>> {
        let mut descriptors = self
            .files()?
            .into_iter()
            .map(|(name, path)| read_descriptor(name, &path))
            .collect::<MigrateResult<Vec<_>>>()?;
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    pub fn get(&self, name: &str) -> MigrateResult<ChangeDescriptor> {
        let parsed = MigrationName::parse(name).ok_or_else(|| MigrateError::UnknownMigration {
            name: name.to_string(),
        })?;
        let path = self.path_for(&parsed);
        if !path.is_file() {
            return Err(MigrateError::UnknownMigration {
                name: name.to_string(),
            });
        }
        read_descriptor(parsed, &path)
    }

    /// Names of every migration file, ordered by ordinal
    pub fn names(&self) -> MigrateResult<Vec<MigrationName>> {
        let mut names: Vec<MigrationName> =
            self.files()?.into_iter().map(|(name, _)| name).collect();
        names.sort();
        Ok(names)
    }

    /// A fresh name that sorts after every existing migration
    pub fn next_name(&self, label: &str) -> MigrateResult<MigrationName> {
        self.next_name_at(label, Utc::now())
    }

    pub fn next_name_at(&self, label: &str, now: DateTime<Utc>) -> MigrateResult<MigrationName> {
        let latest = self.names()?.last().map(MigrationName::ordinal);
        MigrationName::new(MigrationName::next_ordinal(now, latest), label)
    }

    /// Write a new migration file; an existing file of the same name is never replaced
    pub fn write(&self, descriptor: &ChangeDescriptor) -> MigrateResult<PathBuf> {
        fs::create_dir_all(&self.folder).map_err(|e| MigrateError::io(&self.folder, e))?;

        let path = self.path_for(&descriptor.name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| MigrateError::io(&path, e))?;
        file.write_all(render(descriptor, Utc::now()).as_bytes())
            .map_err(|e| MigrateError::io(&path, e))?;

        tracing::info!(migration = %descriptor.name, path = %path.display(), "Wrote migration file");
        Ok(path)
    }

    /// Author a create-table migration from column tokens and write it
    pub fn create_table<S: AsRef<str>>(
        &self,
        table_name: &str,
        column_tokens: &[S],
    ) -> MigrateResult<(ChangeDescriptor, PathBuf)> {
        let table_name = table_identifier(table_name)?;
        let columns = parse_columns(column_tokens)?;
        let name = self.next_name(&format!("create_{}", table_name))?;
        let descriptor = ChangeDescriptor::create_table(name, &table_name, columns)?;
        let path = self.write(&descriptor)?;
        Ok((descriptor, path))
    }

    /// Author an alter-table migration from `add|drop|modify|rename` tokens and write it
    pub fn alter_table<S: AsRef<str>>(
        &self,
        table_name: &str,
        operation_tokens: &[S],
    ) -> MigrateResult<(ChangeDescriptor, PathBuf)> {
        let table_name = table_identifier(table_name)?;
        let operations = parse_operations(operation_tokens)?;
        let name = self.next_name(&format!("alter_{}", table_name))?;
        let descriptor = ChangeDescriptor::alter_table(name, &table_name, operations)?;
        for operation in descriptor.manual_operations() {
            tracing::warn!(
                migration = %descriptor.name,
                operation = %operation,
                "Operation cannot be reversed automatically; write its rollback by hand"
            );
        }
        let path = self.write(&descriptor)?;
        Ok((descriptor, path))
    }

    fn path_for(&self, name: &MigrationName) -> PathBuf {
        self.folder.join(format!("{}.{}", name, EXTENSION))
    }

    fn files(&self) -> MigrateResult<Vec<(MigrationName, PathBuf)>> {
        if !self.folder.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.folder).map_err(|e| MigrateError::io(&self.folder, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| MigrateError::io(&self.folder, e))?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != EXTENSION) {
                continue;
            }
            match path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(MigrationName::parse)
            {
                Some(name) => files.push((name, path)),
                None => tracing::warn!(
                    path = %path.display(),
                    "Skipping .sql file not named m_<ordinal>_<label>.sql"
                ),
            }
        }
        Ok(files)
    }
}

/// Migration file text for a descriptor
pub fn render(descriptor: &ChangeDescriptor, created_at: DateTime<Utc>) -> String {
    let (kind, tokens_line) = match &descriptor.kind {
        ChangeKind::CreateTable { columns } => (
            "create",
            format!("-- Columns: {}", join_tokens(columns.iter())),
        ),
        ChangeKind::AlterTable { operations } => (
            "alter",
            format!("-- Operations: {}", join_tokens(operations.iter())),
        ),
    };

    let mut text = format!(
        "-- Migration: {}\n\
         -- Table: {}\n\
         -- Kind: {}\n\
         {}\n\
         -- Created: {}\n\
         -- Lines starting with `{}` are operations whose rollback must be written by hand.\n\n\
         -- Up migration\n",
        descriptor.name,
        descriptor.table_name,
        kind,
        tokens_line.trim_end(),
        created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        MANUAL_MARKER,
    );
    for statement in &descriptor.up_statements {
        text.push_str(&terminated(statement));
    }
    text.push_str("\n-- Down migration\n");
    for statement in &descriptor.down_statements {
        text.push_str(&terminated(statement));
    }
    text
}

fn join_tokens<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|item| item.to_string()).collect::<Vec<_>>().join(" ")
}

fn terminated(statement: &str) -> String {
    if is_manual_placeholder(statement) {
        format!("{}\n", statement)
    } else {
        format!("{};\n", statement.trim_end().trim_end_matches(';'))
    }
}

/// Rebuild a descriptor from migration file text
pub fn parse(name: MigrationName, path: &Path, content: &str) -> MigrateResult<ChangeDescriptor> {
    let invalid = |reason: String| MigrateError::InvalidMigrationFile {
        path: path.to_path_buf(),
        reason,
    };

    let mut table = None;
    let mut kind = None;
    let mut tokens = None;
    let mut section = Section::Header;
    let mut up = SectionReader::default();
    let mut down = SectionReader::default();

    for line in content.lines() {
        let trimmed = line.trim();
        let lowered = trimmed.to_lowercase();
        if lowered.starts_with(UP_SECTION) {
            section = Section::Up;
            continue;
        }
        if lowered.starts_with(DOWN_SECTION) {
            section = Section::Down;
            continue;
        }

        match section {
            Section::Header => {
                if let Some(value) = header_value(trimmed, "Table") {
                    table = Some(value.to_string());
                } else if let Some(value) = header_value(trimmed, "Kind") {
                    kind = Some(value.to_lowercase());
                } else if let Some(value) = header_value(trimmed, "Columns") {
                    tokens = Some(value.to_string());
                } else if let Some(value) = header_value(trimmed, "Operations") {
                    tokens = Some(value.to_string());
                }
            }
            Section::Up => up.push(line),
            Section::Down => down.push(line),
        }
    }

    let table_name = table.ok_or_else(|| invalid("missing '-- Table:' header".to_string()))?;
    let words: Vec<&str> = tokens.as_deref().unwrap_or_default().split_whitespace().collect();
    let kind = match kind.as_deref() {
        Some("create") => ChangeKind::CreateTable {
            columns: parse_columns(&words).map_err(|e| invalid(e.to_string()))?,
        },
        Some("alter") => ChangeKind::AlterTable {
            operations: parse_operations(&words).map_err(|e| invalid(e.to_string()))?,
        },
        Some(other) => return Err(invalid(format!("unknown kind '{}'", other))),
        None => return Err(invalid("missing '-- Kind:' header".to_string())),
    };

    let up_statements = up.finish();
    let down_statements = down.finish();
    let unreversed = down_statements
        .iter()
        .filter_map(|statement| statement.trim_start().strip_prefix(MANUAL_MARKER))
        .map(|operation| operation.trim().to_string())
        .collect();

    Ok(ChangeDescriptor {
        name,
        table_name,
        kind,
        up_statements,
        down_statements,
        unreversed,
    })
}

fn read_descriptor(name: MigrationName, path: &Path) -> MigrateResult<ChangeDescriptor> {
    let content = fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
    parse(name, path, &content)
}

fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix("--")?
        .trim_start()
        .strip_prefix(key)?
        .strip_prefix(':')
        .map(str::trim)
}

enum Section {
    Header,
    Up,
    Down,
}

/// Collects one section's statements, keeping `-- manual:` placeholders in place
#[derive(Default)]
struct SectionReader {
    statements: Vec<String>,
    buffer: Vec<String>,
}

impl SectionReader {
    fn push(&mut self, line: &str) {
        let trimmed = line.trim();
        if is_manual_placeholder(trimmed) {
            self.flush();
            self.statements.push(trimmed.to_string());
        } else if !trimmed.is_empty() && !trimmed.starts_with("--") {
            self.buffer.push(line.to_string());
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let sql = self.buffer.join("\n");
        self.buffer.clear();
        self.statements.extend(split_sql_statements(&sql));
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.statements
    }
}

/// Split SQL text into statements, falling back to naive `;` splitting when
/// the text does not parse
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(parsed) => parsed.into_iter().map(|stmt| stmt.to_string()).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }
}
