//! Column Spec Parser
//!
//! Parses the compact `name[:type[(args)]][!]` column notation used on the
//! command line into typed column descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::{is_reserved_word, is_sql_identifier};

use crate::error::{MigrateError, MigrateResult};

/// Length used when a column has no type or a bare `varchar`
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// Supported column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Varchar(u32),
    Text,
    Integer,
    BigInt,
    Decimal { precision: u32, scale: u32 },
    Boolean,
    Timestamp,
    Date,
    Json,
    Uuid,
}

impl SqlType {
    /// Parse a type expression such as `varchar(100)` or `decimal(10,2)`
    pub fn parse(expr: &str) -> Result<Self, String> {
        let expr = expr.trim().to_lowercase();
        let (base, args) = match expr.find('(') {
            Some(open) => {
                if !expr.ends_with(')') {
                    return Err(format!("unterminated argument list in '{}'", expr));
                }
                let inner = &expr[open + 1..expr.len() - 1];
                let args = inner
                    .split(',')
                    .map(|arg| parse_positive(arg.trim()))
                    .collect::<Result<Vec<u32>, String>>()?;
                (expr[..open].trim().to_string(), Some(args))
            }
            None => (expr.clone(), None),
        };

        match (base.as_str(), args.as_deref()) {
            ("varchar", None) => Ok(SqlType::Varchar(DEFAULT_VARCHAR_LENGTH)),
            ("varchar", Some([length])) => Ok(SqlType::Varchar(*length)),
            ("varchar", Some(_)) => Err("varchar takes exactly one length argument".to_string()),
            ("decimal", Some([precision, scale])) => {
                if scale > precision {
                    return Err(format!(
                        "decimal scale {} exceeds precision {}",
                        scale, precision
                    ));
                }
                Ok(SqlType::Decimal {
                    precision: *precision,
                    scale: *scale,
                })
            }
            ("decimal", _) => Err("decimal requires exactly two arguments: decimal(p,s)".to_string()),
            (name, Some(_)) if Self::simple(name).is_some() => {
                Err(format!("type '{}' takes no arguments", name))
            }
            (name, None) => {
                Self::simple(name).ok_or_else(|| format!("unsupported type '{}'", name))
            }
            (name, Some(_)) => Err(format!("unsupported type '{}'", name)),
        }
    }

    fn simple(name: &str) -> Option<Self> {
        match name {
            "text" => Some(SqlType::Text),
            "integer" | "int" => Some(SqlType::Integer),
            "bigint" => Some(SqlType::BigInt),
            "boolean" | "bool" => Some(SqlType::Boolean),
            "timestamp" => Some(SqlType::Timestamp),
            "date" => Some(SqlType::Date),
            "json" => Some(SqlType::Json),
            "uuid" => Some(SqlType::Uuid),
            _ => None,
        }
    }

    /// PostgreSQL type text used in DDL
    pub fn sql(&self) -> String {
        match self {
            SqlType::Varchar(length) => format!("VARCHAR({})", length),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({},{})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Uuid => "UUID".to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    /// Token form, the inverse of [`SqlType::parse`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Varchar(length) => write!(f, "varchar({})", length),
            SqlType::Text => write!(f, "text"),
            SqlType::Integer => write!(f, "integer"),
            SqlType::BigInt => write!(f, "bigint"),
            SqlType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            SqlType::Boolean => write!(f, "boolean"),
            SqlType::Timestamp => write!(f, "timestamp"),
            SqlType::Date => write!(f, "date"),
            SqlType::Json => write!(f, "json"),
            SqlType::Uuid => write!(f, "uuid"),
        }
    }
}

fn parse_positive(arg: &str) -> Result<u32, String> {
    match arg.parse::<u32>() {
        Ok(0) => Err(format!("type argument '{}' must be positive", arg)),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("type argument '{}' is not an integer", arg)),
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl ColumnSpec {
    /// A nullable column
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Parse one `name[:type[(args)]][!]` token
    pub fn parse(token: &str) -> MigrateResult<Self> {
        let trimmed = token.trim();
        let (body, nullable) = match trimmed.strip_suffix('!') {
            Some(body) => (body, false),
            None => (trimmed, true),
        };

        let (name, type_expr) = match body.split_once(':') {
            Some((name, type_expr)) => (name.trim(), Some(type_expr.trim())),
            None => (body, None),
        };

        if name.is_empty() {
            return Err(MigrateError::malformed_column(token, "column name is empty"));
        }
        if !is_sql_identifier(name) {
            return Err(MigrateError::malformed_column(
                token,
                format!("'{}' is not a valid column name", name),
            ));
        }
        if is_reserved_word(name) {
            return Err(MigrateError::malformed_column(
                token,
                format!("'{}' is a reserved word", name),
            ));
        }

        let sql_type = match type_expr {
            None => SqlType::Varchar(DEFAULT_VARCHAR_LENGTH),
            Some("") => return Err(MigrateError::malformed_column(token, "type is empty")),
            Some(expr) => {
                SqlType::parse(expr).map_err(|reason| MigrateError::malformed_column(token, reason))?
            }
        };

        // Unquoted names fold to lower case in PostgreSQL
        Ok(Self {
            name: name.to_lowercase(),
            sql_type,
            nullable,
        })
    }

    /// Column definition as it appears inside `CREATE TABLE` / `ADD COLUMN`
    pub fn definition(&self) -> String {
        if self.nullable {
            format!("{} {}", self.name, self.sql_type.sql())
        } else {
            format!("{} {} NOT NULL", self.name, self.sql_type.sql())
        }
    }
}

impl fmt::Display for ColumnSpec {
    /// Token form, the inverse of [`ColumnSpec::parse`]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.sql_type)?;
        if !self.nullable {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// Parse a list of column tokens, stopping at the first bad one
pub fn parse_columns<S: AsRef<str>>(tokens: &[S]) -> MigrateResult<Vec<ColumnSpec>> {
    tokens
        .iter()
        .map(|token| ColumnSpec::parse(token.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_column() {
        let column = ColumnSpec::parse("name:varchar(100)").unwrap();
        assert_eq!(column.name, "name");
        assert_eq!(column.sql_type, SqlType::Varchar(100));
        assert!(column.nullable);
    }

    #[test]
    fn test_missing_type_defaults_to_varchar() {
        let column = ColumnSpec::parse("nickname").unwrap();
        assert_eq!(column.sql_type, SqlType::Varchar(255));

        let bare = ColumnSpec::parse("title:varchar").unwrap();
        assert_eq!(bare.sql_type, SqlType::Varchar(255));
    }

    #[test]
    fn test_aliases_and_case() {
        assert_eq!(ColumnSpec::parse("age:INT").unwrap().sql_type, SqlType::Integer);
        assert_eq!(ColumnSpec::parse("active:bool").unwrap().sql_type, SqlType::Boolean);
        assert_eq!(
            ColumnSpec::parse("price:Decimal(10, 2)").unwrap().sql_type,
            SqlType::Decimal { precision: 10, scale: 2 }
        );
    }

    #[test]
    fn test_names_fold_to_lower_case() {
        let column = ColumnSpec::parse("firstName:text").unwrap();
        assert_eq!(column.name, "firstname");
        assert_eq!(column.definition(), "firstname TEXT");

        assert_eq!(ColumnSpec::parse("ordered_at:timestamp").unwrap().name, "ordered_at");
    }

    #[test]
    fn test_not_null_suffix() {
        let column = ColumnSpec::parse("email:varchar(100)!").unwrap();
        assert!(!column.nullable);
        assert_eq!(column.definition(), "email VARCHAR(100) NOT NULL");
        assert_eq!(column.to_string(), "email:varchar(100)!");
    }

    #[test]
    fn test_unsupported_type() {
        let err = ColumnSpec::parse("blob:bytea").unwrap_err();
        match err {
            MigrateError::MalformedColumnSpec { token, reason } => {
                assert_eq!(token, "blob:bytea");
                assert!(reason.contains("unsupported type"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_type_arguments() {
        for token in [
            "price:decimal",
            "price:decimal(10)",
            "price:decimal(2,5)",
            "price:decimal(a,b)",
            "name:varchar(0)",
            "name:varchar(-1)",
            "name:varchar(10,2)",
            "name:varchar(10",
            "age:integer(4)",
            "name:",
            ":integer",
            "first-name:text",
            "order:integer",
            "group:text",
            "User:text",
        ] {
            assert!(
                matches!(ColumnSpec::parse(token), Err(MigrateError::MalformedColumnSpec { .. })),
                "expected {token} to be rejected"
            );
        }
    }

    #[test]
    fn test_type_text_round_trip() {
        let types = [
            SqlType::Varchar(255),
            SqlType::Text,
            SqlType::Integer,
            SqlType::BigInt,
            SqlType::Decimal { precision: 12, scale: 4 },
            SqlType::Boolean,
            SqlType::Timestamp,
            SqlType::Date,
            SqlType::Json,
            SqlType::Uuid,
        ];

        for sql_type in types {
            assert_eq!(SqlType::parse(&sql_type.to_string()).unwrap(), sql_type);
            assert_eq!(SqlType::parse(&sql_type.sql()).unwrap(), sql_type);
        }
        assert_eq!(SqlType::Varchar(255).sql(), "VARCHAR(255)");
    }

    #[test]
    fn test_parse_columns_stops_at_first_error() {
        let columns = parse_columns(&["name:varchar(255)", "age:integer"]).unwrap();
        assert_eq!(columns.len(), 2);

        let err = parse_columns(&["name", "age:number", "x:y"]).unwrap_err();
        assert!(err.to_string().contains("age:number"));
    }
}
