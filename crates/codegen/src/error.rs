use std::path::PathBuf;

use strata_migrate::MigrateError;
use thiserror::Error;

pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Template error: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error("'{value}' cannot be used as a Rust identifier for {what}")]
    InvalidName { what: &'static str, value: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CodegenError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodegenError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<CodegenError> for MigrateError {
    fn from(err: CodegenError) -> Self {
        match err {
            CodegenError::Io { path, source } => MigrateError::Io { path, source },
            other => MigrateError::Template(other.to_string()),
        }
    }
}
