//! Core types and data model for metricflow
//!
//! This crate provides the data structures shared by the configuration layer,
//! the processing engine and every plugin: records and their values, time
//! ranges, metric definitions and frozen results.

pub mod errors;
pub mod metrics;
pub mod record;
pub mod time;
pub mod value;

pub use errors::{Result, TypesError};
pub use metrics::{FrozenMetricResult, MetricConfig, MetricValue};
pub use record::{FieldDef, FieldSchema, RawRecord, SchemaRecord};
pub use time::{Frequency, TimeRange};
pub use value::{FieldType, FieldValue};
