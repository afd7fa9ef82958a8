use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::validation::{is_reserved_word, is_sql_identifier, ConfigError};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "strata.yaml";

/// Complete configuration for one strata invocation.
///
/// Loaded once (defaults, then the optional YAML file, then environment
/// variables) and handed by value to everything that needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub models: ModelsConfig,
    pub logging: LoggingConfig,
}

/// Target database connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

/// Where migration files live and which table records them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub folder: PathBuf,
    pub table: String,
}

/// Generated data-access mirror settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub folder: PathBuf,
    pub generate: bool,
    /// Trait every generated model implements
    pub base_trait: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: String::new(),
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("migrations"),
            table: "migrations".to_string(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("models"),
            generate: true,
            base_trait: "Model".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl StrataConfig {
    /// Load configuration for this process.
    ///
    /// An explicit `path` must exist. Without one, `strata.yaml` in the
    /// working directory is used when present. Environment variables are
    /// applied last and win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML configuration file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Override values from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Override values from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = port.parse::<u16>().map_err(|_| {
                ConfigError::invalid_value("database.port", port.clone(), "valid port number (1-65535)")
            })?;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = name;
        }
        if let Some(folder) = lookup("MIGRATION_FOLDER") {
            self.migrations.folder = PathBuf::from(folder);
        }
        if let Some(table) = lookup("MIGRATION_TABLE") {
            self.migrations.table = table;
        }
        if let Some(folder) = lookup("MODELS_FOLDER") {
            self.models.folder = PathBuf::from(folder);
        }
        if let Some(generate) = lookup("GENERATE_MODELS") {
            self.models.generate = parse_bool("models.generate", &generate)?;
        }
        if let Some(base) = lookup("ORM_BASE_CLASS") {
            self.models.base_trait = base;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        Ok(())
    }

    /// Validate everything that does not need a database connection
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.migrations.validate()?;
        self.models.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Write the commented default configuration file
    pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists {
                path: path.display().to_string(),
            });
        }
        fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(())
    }
}

impl DatabaseConfig {
    /// Checked separately: only commands that talk to the database need it
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::validation_failed("database.host", "Host cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation_failed("database.port", "Port cannot be 0"));
        }
        if self.name.is_empty() {
            return Err(ConfigError::validation_failed(
                "database.name",
                "Database name cannot be empty (set DB_NAME or database.name)",
            ));
        }
        Ok(())
    }

    /// Connection target without the password, for log lines
    pub fn display_target(&self) -> String {
        format!("postgres://{}@{}:{}/{}", self.user, self.host, self.port, self.name)
    }
}

impl MigrationsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_sql_identifier(&self.table) || is_reserved_word(&self.table) {
            return Err(ConfigError::invalid_value(
                "migrations.table",
                self.table.clone(),
                "a plain SQL identifier that is not a reserved word",
            ));
        }
        if self.folder.as_os_str().is_empty() {
            return Err(ConfigError::validation_failed(
                "migrations.folder",
                "Migration folder cannot be empty",
            ));
        }
        Ok(())
    }
}

impl ModelsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !is_sql_identifier(&self.base_trait) {
            return Err(ConfigError::invalid_value(
                "models.base_trait",
                self.base_trait.clone(),
                "a Rust identifier",
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                self.level.clone(),
                "trace, debug, info, warn, or error",
            ));
        }

        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.format",
                self.format.clone(),
                "compact, pretty, or json",
            ));
        }

        Ok(())
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid_value(field, value, "true or false")),
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# strata configuration
# Every value can be overridden by the environment variable named next to it.

database:
  host: localhost        # DB_HOST
  port: 5432             # DB_PORT
  user: your_username    # DB_USER
  password: ""           # DB_PASSWORD
  name: your_database    # DB_NAME

migrations:
  folder: migrations     # MIGRATION_FOLDER
  table: migrations      # MIGRATION_TABLE

models:
  folder: models         # MODELS_FOLDER
  generate: true         # GENERATE_MODELS
  base_trait: Model      # ORM_BASE_CLASS

logging:
  level: info            # LOG_LEVEL (trace, debug, info, warn, error)
  format: compact        # LOG_FORMAT (compact, pretty, json)
"#;
