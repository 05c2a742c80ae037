//! Plugin capabilities and registry
//!
//! Every stage of a metric run is a named plugin resolved from a
//! [`PluginRegistry`]:
//!
//! - [`Loader`]: produces the raw record sequence for a time window
//! - [`UntypedPreprocessor`] / [`TypedPreprocessor`]: rewrite or drop records
//! - [`Calculator`]: reduces one bucket of records to named values
//! - [`Exporter`]: receives the assembled results
//!
//! Converters are a fifth category: plain value coercions keyed by token and
//! applied before any preprocessor.

pub mod adapter;
pub mod builtin;
pub mod convert;
pub mod registry;

use crate::error::{CalculationResult, ConfigurationError, RecordError, RecordResult, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use metricflow_types::{FieldValue, FrozenMetricResult, MetricConfig, RawRecord, SchemaRecord};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub use adapter::UntypedAdapter;
pub use convert::Converter;
pub use registry::PluginRegistry;

/// Plugin categories, each with its own name space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    Loader,
    Preprocessor,
    Calculator,
    Exporter,
    Converter,
}

impl PluginCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCategory::Loader => "loader",
            PluginCategory::Preprocessor => "preprocessor",
            PluginCategory::Calculator => "calculator",
            PluginCategory::Exporter => "exporter",
            PluginCategory::Converter => "converter",
        }
    }
}

impl fmt::Display for PluginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lazy, single-pass sequence of raw records
pub type RecordStream = Box<dyn Iterator<Item = RawRecord> + Send>;

/// Lazy, single-pass sequence of typed records
pub type TypedStream<T> = Box<dyn Iterator<Item = T> + Send>;

/// Options handed to a loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Connection string or file path
    pub connection: Option<String>,
    /// Query or sheet name
    pub query: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LoadOptions {
    pub fn from_config(config: &MetricConfig, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            connection: config.connection.clone(),
            query: config.query.clone(),
            start,
            end,
        }
    }

    /// Reject options a loader cannot act on
    ///
    /// Called before any I/O is attempted.
    pub fn validate(&self, source_type: &str) -> std::result::Result<(), ConfigurationError> {
        if self.connection.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(ConfigurationError::MissingConnection {
                source_type: source_type.to_string(),
            });
        }
        if self.query.as_deref().map_or(true, |q| q.trim().is_empty()) {
            return Err(ConfigurationError::MissingQuery {
                source_type: source_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn connection(&self) -> &str {
        self.connection.as_deref().unwrap_or_default()
    }

    pub fn query(&self) -> &str {
        self.query.as_deref().unwrap_or_default()
    }
}

/// Source of raw records
#[async_trait]
pub trait Loader: Send + Sync {
    /// Registered source type
    fn source_type(&self) -> &str;

    /// Load the records for `[options.start, options.end)`
    async fn load(&self, options: LoadOptions) -> Result<RecordStream>;
}

/// What to do with a record after a preprocessor ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Drop,
}

/// Preprocessor over raw records, applied one record at a time
pub trait UntypedPreprocessor: Send {
    fn name(&self) -> &str;

    /// Rewrite `record` in place
    fn process(&mut self, record: &mut RawRecord) -> RecordResult<Disposition>;
}

/// Preprocessor over a sequence of typed records
///
/// The stage is consumed and moves into the returned iterator, so it runs
/// lazily as the output is pulled.
pub trait TypedPreprocessor<T: SchemaRecord>: Send {
    fn name(&self) -> &str;

    fn process(
        self: Box<Self>,
        records: TypedStream<T>,
        failures: RecordFailures,
    ) -> TypedStream<T>;
}

/// Reduces the records of one bucket to named values
///
/// Must be deterministic for a given input. Calculators are invoked for
/// every bucket, including empty ones.
pub trait Calculator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether buckets may be computed concurrently with this instance
    fn is_thread_safe(&self) -> bool {
        false
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>>;
}

/// Receives assembled results
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Registered target type
    fn target_type(&self) -> &str;

    /// Export a batch sorted by bucket start; an empty batch is a no-op
    async fn export(&self, results: &[FrozenMetricResult]) -> Result<()>;
}

/// Shared collector for record-local failures
#[derive(Debug, Clone, Default)]
pub struct RecordFailures {
    inner: Arc<Mutex<Vec<RecordError>>>,
}

impl RecordFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: RecordError) {
        self.inner.lock().push(error);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drain collected failures
    pub fn take(&self) -> Vec<RecordError> {
        std::mem::take(&mut *self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options(connection: Option<&str>, query: Option<&str>) -> LoadOptions {
        LoadOptions {
            connection: connection.map(String::from),
            query: query.map(String::from),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_load_options_validation() {
        assert!(options(Some("db"), Some("select 1")).validate("sql").is_ok());

        assert_eq!(
            options(None, Some("select 1")).validate("sql"),
            Err(ConfigurationError::MissingConnection {
                source_type: "sql".to_string()
            })
        );
        assert_eq!(
            options(Some("db"), Some("  ")).validate("sql"),
            Err(ConfigurationError::MissingQuery {
                source_type: "sql".to_string()
            })
        );
    }

    #[test]
    fn test_load_options_from_config() {
        let config =
            MetricConfig::new("orders", "day").with_source("sql", "postgres://db", "select *");
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let options = LoadOptions::from_config(&config, start, end);
        assert_eq!(options.connection(), "postgres://db");
        assert_eq!(options.query(), "select *");
    }

    #[test]
    fn test_record_failures_are_shared() {
        let failures = RecordFailures::new();
        let handle = failures.clone();
        handle.push(RecordError::MissingTimestamp {
            field: "ts".to_string(),
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.take().len(), 1);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(PluginCategory::Converter.to_string(), "converter");
    }
}
