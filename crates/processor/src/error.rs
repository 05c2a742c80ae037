//! Error types for the metric processor
//!
//! The taxonomy follows how far a failure reaches:
//! - configuration and plugin resolution errors abort a run before any I/O
//! - load errors abort a run
//! - record and calculation errors stay local to one record or one bucket and
//!   are reported in the run summary instead of being returned

use crate::plugin::PluginCategory;
use metricflow_config::ConfigError;
use metricflow_types::TypesError;
use thiserror::Error;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Plugin could not be resolved
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Loading records failed
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// A single record could not be processed
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// A calculator failed for one bucket
    #[error("calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Exporting results failed
    #[error("export error: {0}")]
    Export(String),

    /// Installing the log subscriber failed
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

/// Configuration errors, fatal before any I/O
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Loader has no connection string or path
    #[error("missing connection for source {source_type}")]
    MissingConnection { source_type: String },

    /// Loader has no query or sheet
    #[error("missing query for source {source_type}")]
    MissingQuery { source_type: String },

    /// Frequency token is not day, week or month
    #[error("unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    /// Converter token has no registered conversion
    #[error("unsupported converter '{token}' for property '{property}'")]
    UnsupportedConverter { property: String, token: String },

    /// Metric declares no calculator
    #[error("metric {metric} declares no calculators")]
    NoCalculators { metric: String },

    /// A plugin setting is missing or malformed
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Engine configuration rejected
    #[error("invalid engine configuration: {0}")]
    Engine(String),
}

impl From<TypesError> for ConfigurationError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::UnsupportedFrequency(token) => {
                ConfigurationError::UnsupportedFrequency(token)
            }
            other => ConfigurationError::InvalidSetting(other.to_string()),
        }
    }
}

impl From<ConfigError> for ConfigurationError {
    fn from(err: ConfigError) -> Self {
        ConfigurationError::Engine(err.to_string())
    }
}

/// Plugin resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// No factory registered under the name
    #[error("{category} plugin not found: {name}")]
    NotFound { category: PluginCategory, name: String },

    /// Factory produced an instance without the requested capability
    #[error("{category} plugin {name} does not provide {expected}")]
    TypeMismatch {
        category: PluginCategory,
        name: String,
        expected: String,
    },
}

/// Loader errors
#[derive(Error, Debug)]
pub enum LoadError {
    /// Loader exceeded the configured timeout
    #[error("loading from {source_type} timed out after {timeout_ms}ms")]
    Timeout { source_type: String, timeout_ms: u64 },

    /// The underlying source failed
    #[error("source {source_type} failed: {reason}")]
    Source { source_type: String, reason: String },
}

/// Record-local errors, recovered by keeping the record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A converter could not coerce a value
    #[error("cannot convert field {field} with '{token}': {reason}")]
    Conversion {
        field: String,
        token: String,
        reason: String,
    },

    /// The timestamp field is absent
    #[error("record has no timestamp field {field}")]
    MissingTimestamp { field: String },

    /// The timestamp field holds a non-timestamp value
    #[error("field {field} is not a timestamp: {actual}")]
    InvalidTimestamp { field: String, actual: String },

    /// A preprocessor failed for this record
    #[error("preprocessor {preprocessor} failed: {reason}")]
    Preprocessor { preprocessor: String, reason: String },
}

/// Bucket-local calculator errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculationError {
    /// Calculator returned an error
    #[error("calculator {calculator} failed: {reason}")]
    Failed { calculator: String, reason: String },

    /// Calculator panicked
    #[error("calculator {calculator} panicked: {reason}")]
    Panicked { calculator: String, reason: String },
}

impl CalculationError {
    pub fn failed(calculator: impl Into<String>, reason: impl ToString) -> Self {
        CalculationError::Failed {
            calculator: calculator.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for calculator operations
pub type CalculationResult<T> = std::result::Result<T, CalculationError>;

/// Result type alias for per-record operations
pub type RecordResult<T> = std::result::Result<T, RecordError>;

impl From<TypesError> for ProcessorError {
    fn from(err: TypesError) -> Self {
        ProcessorError::Configuration(err.into())
    }
}

impl From<ConfigError> for ProcessorError {
    fn from(err: ConfigError) -> Self {
        ProcessorError::Configuration(err.into())
    }
}
