//! Migration names and their ordering ordinal
//!
//! A name is `m_<ordinal>_<label>` with the ordinal zero-padded to a fixed
//! width, so sorting names as strings sorts them by ordinal.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{MigrateError, MigrateResult};

/// Digits in every ordinal
pub const ORDINAL_WIDTH: usize = 16;

const PREFIX: &str = "m_";

/// Identity of one migration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigrationName {
    ordinal: u64,
    label: String,
}

impl MigrationName {
    pub fn new(ordinal: u64, label: impl Into<String>) -> MigrateResult<Self> {
        let label = label.into();
        if ordinal >= 10u64.pow(ORDINAL_WIDTH as u32) {
            return Err(MigrateError::InvalidIdentifier {
                value: ordinal.to_string(),
            });
        }
        if label.is_empty()
            || !label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(MigrateError::InvalidIdentifier { value: label });
        }
        Ok(Self { ordinal, label })
    }

    /// Parse `m_<16 digits>_<label>`; `None` when the text is not a migration name
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix(PREFIX)?;
        if rest.len() < ORDINAL_WIDTH || !rest.is_char_boundary(ORDINAL_WIDTH) {
            return None;
        }
        let (digits, label) = rest.split_at(ORDINAL_WIDTH);
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let label = label.strip_prefix('_')?;
        let ordinal = digits.parse::<u64>().ok()?;
        Self::new(ordinal, label).ok()
    }

    /// Ordinal for a migration created at `now`, strictly after `latest`.
    ///
    /// The clock gives `YYYYMMDDHHMMSS` followed by a two digit counter; when
    /// the clock has not moved past the newest existing migration the counter
    /// is bumped instead.
    pub fn next_ordinal(now: DateTime<Utc>, latest: Option<u64>) -> u64 {
        let clock = now
            .format("%Y%m%d%H%M%S")
            .to_string()
            .parse::<u64>()
            .unwrap_or(0)
            * 100;
        match latest {
            Some(latest) if latest >= clock => latest + 1,
            _ => clock,
        }
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for MigrationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}_{}",
            PREFIX,
            self.ordinal,
            self.label,
            width = ORDINAL_WIDTH
        )
    }
}
