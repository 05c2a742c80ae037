//! Outcome of one metric run

use crate::error::{CalculationError, RecordError};
use metricflow_types::{FrozenMetricResult, TimeRange};
use serde::Serialize;
use std::fmt;

/// A recovered failure surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// One record could not be fully processed; it was kept or discarded
    Record(RecordError),

    /// A calculator failed for one bucket; that result is missing
    Bucket {
        bucket: TimeRange,
        calculator: String,
        error: CalculationError,
    },

    /// The run continued in a fallback mode
    Degraded { reason: String },

    /// The exporter rejected the batch
    Export { reason: String },
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Record(err) => write!(f, "record: {}", err),
            RunFailure::Bucket { bucket, error, .. } => write!(f, "bucket {}: {}", bucket, error),
            RunFailure::Degraded { reason } => write!(f, "degraded: {}", reason),
            RunFailure::Export { reason } => write!(f, "export: {}", reason),
        }
    }
}

/// Statistics for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Records produced by the loader
    pub records_loaded: u64,

    /// Records that reached grouping after preprocessing
    pub records_processed: u64,

    /// Records outside every bucket or without a usable timestamp
    pub records_discarded: u64,

    /// Buckets generated for the window
    pub buckets: u64,

    /// Bucket calculations that produced a result
    pub calculations_succeeded: u64,

    /// Bucket calculations that failed
    pub calculations_failed: u64,
}

/// Results and failures of one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Results sorted by bucket start, then calculator order
    pub results: Vec<FrozenMetricResult>,

    pub failures: Vec<RunFailure>,

    pub stats: RunStats,

    /// The run stopped early; `results` holds what completed
    pub cancelled: bool,

    /// The batch was accepted by the exporter
    pub exported: bool,

    /// The configured timezone could not be resolved
    pub degraded: bool,
}

impl RunSummary {
    /// Summary of a run cancelled before any result was computed
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn discarded_records(&self) -> u64 {
        self.stats.records_discarded
    }

    pub fn processed_records(&self) -> u64 {
        self.stats.records_processed
    }

    pub fn record_failures(&self) -> impl Iterator<Item = &RecordError> {
        self.failures.iter().filter_map(|failure| match failure {
            RunFailure::Record(err) => Some(err),
            _ => None,
        })
    }

    pub fn bucket_failures(&self) -> impl Iterator<Item = (&TimeRange, &CalculationError)> {
        self.failures.iter().filter_map(|failure| match failure {
            RunFailure::Bucket { bucket, error, .. } => Some((bucket, error)),
            _ => None,
        })
    }

    /// Every bucket succeeded, nothing was cancelled and the batch was exported
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.exported
            && !self
                .failures
                .iter()
                .any(|f| matches!(f, RunFailure::Bucket { .. } | RunFailure::Export { .. }))
    }
}
