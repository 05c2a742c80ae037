//! Metric aggregation engine for metricflow
//!
//! This crate turns raw records from a pluggable loader into per-bucket
//! metric results handed to a pluggable exporter. Bucket boundaries follow
//! calendar days, weeks and months in a configured timezone.

pub mod aggregation;
pub mod error;
pub mod pipeline;
pub mod plugin;
pub mod telemetry;
pub mod window;

// Re-export commonly used types
pub use error::{
    CalculationError, ConfigurationError, LoadError, PluginError, ProcessorError, RecordError,
    Result as ProcessorResult,
};

pub use pipeline::{
    GroupedRecords, MetricPipeline, Orchestrator, PreprocessingPipeline, ResultAssembler,
    RunFailure, RunStats, RunSummary, TypedPreprocessingPipeline,
};

pub use plugin::{
    Calculator, Converter, Disposition, Exporter, LoadOptions, Loader, PluginCategory,
    PluginRegistry, RecordFailures, RecordStream, TypedPreprocessor, TypedStream, UntypedAdapter,
    UntypedPreprocessor,
};

pub use window::{BucketAssigner, TargetZone, TimeBucketer};

pub use aggregation::{AggregateCalculator, AggregateKind, Aggregator};
