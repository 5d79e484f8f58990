//! Error types for Synheart Cards
//!
//! Data absence is never an error: it shows up as `None` fields, empty
//! collections and warnings inside a successful envelope. The enums below
//! cover the three remaining cases: bad requests, broken row sources and
//! invalid catalog tables.

use thiserror::Error;

/// Failure of the row source boundary (storage unreachable, unreadable input)
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse row on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Row source unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of the card API
#[derive(Debug, Error)]
pub enum CardError {
    #[error("Invalid date for '{field}': {value}")]
    InvalidDate { field: String, value: String },

    #[error("Unknown card type: {0}")]
    UnknownCardType(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid range: 'to' ({to}) is before 'from' ({from})")]
    InvalidRange { from: String, to: String },

    #[error("Invalid request JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CardError {
    /// True when the request itself was malformed, as opposed to the
    /// row source failing underneath a valid request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CardError::Source(_))
    }
}

/// Errors raised while loading a static catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Duplicate signal name in catalog: {0}")]
    DuplicateSignal(String),

    #[error("Duplicate goal for signal: {0}")]
    DuplicateGoal(String),

    #[error("Goal for '{0}' has priority 0; priorities start at 1")]
    InvalidPriority(String),
}
