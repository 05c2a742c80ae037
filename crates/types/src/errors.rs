//! Error types for the data model

use thiserror::Error;

/// Result type alias for data model operations
pub type Result<T> = std::result::Result<T, TypesError>;

/// Violations of data model invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("unsupported frequency: {0} (expected day, week or month)")]
    UnsupportedFrequency(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field {field} is read-only")]
    ReadOnlyField { field: String },

    #[error("type mismatch for field {field}: expected {expected}, got {actual}")]
    FieldTypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}
