//! Metric definitions and computed results

use crate::errors::{Result, TypesError};
use crate::time::{Frequency, TimeRange};
use crate::value::FieldValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

/// Definition of one metric computation
///
/// Owned by the caller and handed read-only to every plugin factory. Beyond
/// the well-known fields, plugins read their own options from `settings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric definition id
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Metric name
    pub name: String,

    /// Frequency token (`day`, `week` or `month`)
    pub frequency: String,

    /// Unit of the computed value
    #[serde(default)]
    pub unit: String,

    /// Field holding each record's timestamp
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    /// Registered loader name
    #[serde(default)]
    pub source_type: String,

    /// Connection string or file path handed to the loader
    #[serde(default)]
    pub connection: Option<String>,

    /// Query or sheet name handed to the loader
    #[serde(default)]
    pub query: Option<String>,

    /// Property name to converter token, applied in declaration order
    #[serde(default)]
    pub converters: IndexMap<String, String>,

    /// Registered preprocessor names, applied in order after conversion
    #[serde(default)]
    pub preprocessors: Vec<String>,

    /// Registered calculator names
    #[serde(default)]
    pub calculators: Vec<String>,

    /// Registered exporter name
    #[serde(default)]
    pub target_type: String,

    /// Plugin-specific options
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl MetricConfig {
    /// Create a metric definition with a fresh id and defaults elsewhere
    pub fn new(name: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            frequency: frequency.into(),
            unit: String::new(),
            timestamp_field: default_timestamp_field(),
            source_type: String::new(),
            connection: None,
            query: None,
            converters: IndexMap::new(),
            preprocessors: Vec::new(),
            calculators: Vec::new(),
            target_type: String::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn with_source(
        mut self,
        source_type: impl Into<String>,
        connection: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        self.source_type = source_type.into();
        self.connection = Some(connection.into());
        self.query = Some(query.into());
        self
    }

    pub fn with_converter(mut self, property: impl Into<String>, token: impl Into<String>) -> Self {
        self.converters.insert(property.into(), token.into());
        self
    }

    pub fn with_preprocessor(mut self, name: impl Into<String>) -> Self {
        self.preprocessors.push(name.into());
        self
    }

    pub fn with_calculator(mut self, name: impl Into<String>) -> Self {
        self.calculators.push(name.into());
        self
    }

    pub fn with_target(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = target_type.into();
        self
    }

    pub fn with_setting(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Parse the frequency token
    pub fn parsed_frequency(&self) -> Result<Frequency> {
        self.frequency.parse()
    }

    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    /// String setting, falling back to `default` when absent
    pub fn setting_str<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.settings.get(key) {
            None => Ok(default),
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(other) => Err(TypesError::InvalidSetting {
                key: key.to_string(),
                reason: format!("expected a string, got {}", other),
            }),
        }
    }

    /// Required string setting
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.settings.get(key) {
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(other) => Err(TypesError::InvalidSetting {
                key: key.to_string(),
                reason: format!("expected a string, got {}", other),
            }),
            None => Err(TypesError::InvalidSetting {
                key: key.to_string(),
                reason: "missing".to_string(),
            }),
        }
    }
}

/// Computed value of a metric for one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// The calculator produced exactly one output field
    Scalar(FieldValue),
    /// The calculator produced several named outputs
    Structured(IndexMap<String, FieldValue>),
}

impl MetricValue {
    /// Collapse a calculator output mapping into a value
    pub fn from_outputs(mut outputs: IndexMap<String, FieldValue>) -> Self {
        if outputs.len() == 1 {
            match outputs.pop() {
                Some((_, value)) => MetricValue::Scalar(value),
                None => MetricValue::Structured(outputs),
            }
        } else {
            MetricValue::Structured(outputs)
        }
    }

    pub fn as_scalar(&self) -> Option<&FieldValue> {
        match self {
            MetricValue::Scalar(v) => Some(v),
            MetricValue::Structured(_) => None,
        }
    }

    /// Look up a named output; a scalar answers to any name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        match self {
            MetricValue::Scalar(v) => Some(v),
            MetricValue::Structured(map) => map.get(name),
        }
    }
}

/// An immutable, fully computed metric result for one bucket
///
/// Fields are private and only exposed by value or shared reference; there
/// is no way to change a result once it has been built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrozenMetricResult {
    metric_name: String,
    metric_id: Uuid,
    calculator: String,
    value: MetricValue,
    unit: String,
    bucket: TimeRange,
    frequency: Frequency,
    record_count: usize,
    #[serde(with = "duration_micros")]
    elapsed: Duration,
}

impl FrozenMetricResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metric_name: impl Into<String>,
        metric_id: Uuid,
        calculator: impl Into<String>,
        value: MetricValue,
        unit: impl Into<String>,
        bucket: TimeRange,
        frequency: Frequency,
        record_count: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            metric_id,
            calculator: calculator.into(),
            value,
            unit: unit.into(),
            bucket,
            frequency,
            record_count,
            elapsed,
        }
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn metric_id(&self) -> Uuid {
        self.metric_id
    }

    /// Name of the calculator that produced the value
    pub fn calculator(&self) -> &str {
        &self.calculator
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn bucket(&self) -> &TimeRange {
        &self.bucket
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Number of source records in the bucket
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Wall-clock time spent computing this result
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

mod duration_micros {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_micros() as u64)
    }
}
