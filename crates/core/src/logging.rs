//! Structured logging setup for the strata binaries.
//!
//! Libraries only emit `tracing` events; installing a subscriber is the
//! binary's job and happens once, right after configuration is loaded.

use std::io;

use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Filter directive for the configured level; `RUST_LOG` still wins
pub fn filter_directive(config: &LoggingConfig) -> String {
    let level = config.level.to_lowercase();
    format!("warn,strata={level},strata_core={level},strata_migrate={level},strata_codegen={level}")
}

/// Initialize logging for the process
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(config)))?;

    match LogFormat::from_config(&config.format) {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).pretty())
            .try_init()?,
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).compact())
            .try_init()?,
    }

    tracing::debug!(
        target: "strata::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        config.format
    );

    Ok(())
}
