use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// PostgreSQL keywords that are reserved in every position, sorted
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "system_user", "table", "then",
    "to", "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed for '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("Configuration file '{path}' already exists")]
    AlreadyExists { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Whether `value` can be spliced into SQL as a bare identifier.
///
/// Table and column names end up in DDL text rather than bound parameters,
/// so everything that reaches a statement is checked against this first.
pub fn is_sql_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Whether PostgreSQL rejects `value` as an unquoted table or column name
pub fn is_reserved_word(value: &str) -> bool {
    RESERVED_WORDS
        .binary_search(&value.to_lowercase().as_str())
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_words() {
        assert!(RESERVED_WORDS.windows(2).all(|pair| pair[0] < pair[1]));

        assert!(is_reserved_word("order"));
        assert!(is_reserved_word("GROUP"));
        assert!(is_reserved_word("User"));
        assert!(!is_reserved_word("users"));
        assert!(!is_reserved_word("order_items"));
        assert!(!is_reserved_word("name"));
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("users"));
        assert!(is_sql_identifier("_schema_migrations"));
        assert!(is_sql_identifier("order_items2"));

        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("2fast"));
        assert!(!is_sql_identifier("users; DROP TABLE x"));
        assert!(!is_sql_identifier("first-name"));
    }

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigError::invalid_value("port", "abc", "valid port number (1-65535)");
        assert_eq!(
            err.to_string(),
            "Invalid value for field 'port': 'abc'. Expected: valid port number (1-65535)"
        );
    }
}
