//! # strata-core
//!
//! Configuration and logging shared by the strata crates.

pub mod config;
pub mod logging;

pub use config::{
    is_reserved_word, is_sql_identifier, ConfigError, DatabaseConfig, LoggingConfig, MigrationsConfig, ModelsConfig,
    StrataConfig, DEFAULT_CONFIG_FILE,
};
pub use logging::init_logging;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
