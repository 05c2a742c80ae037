//! Metric run pipeline
//!
//! A run flows through these stages:
//!
//! 1. [`PreprocessingPipeline`]: converters, then preprocessors, applied lazily
//! 2. [`GroupedRecords`]: every record assigned to the bucket holding its timestamp
//! 3. [`Orchestrator`]: calculators invoked per bucket, in parallel when thread-safe
//! 4. [`ResultAssembler`]: bucket outputs frozen into sorted results
//!
//! [`MetricPipeline`] wires them together with a loader and an exporter and
//! returns a [`RunSummary`].
//!
//! # Example
//!
//! ```rust,no_run
//! use metricflow_config::EngineConfig;
//! use metricflow_processor::pipeline::MetricPipeline;
//! use metricflow_processor::plugin::PluginRegistry;
//! use metricflow_types::MetricConfig;
//! use chrono::{TimeZone, Utc};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> metricflow_processor::error::Result<()> {
//! let registry = Arc::new(PluginRegistry::with_builtins());
//! // register a loader named "sql" and an exporter named "warehouse" here
//!
//! let engine = EngineConfig::default().with_timezone("Asia/Shanghai");
//! let pipeline = MetricPipeline::new(registry, engine)?;
//! let metric = MetricConfig::new("orders", "month")
//!     .with_source("sql", "postgres://localhost/shop", "select * from orders")
//!     .with_converter("price", "decimal")
//!     .with_calculator("count")
//!     .with_target("warehouse");
//!
//! let summary = pipeline
//!     .run(
//!         &metric,
//!         Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{} results, {} discarded", summary.results.len(), summary.discarded_records());
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod orchestrator;
pub mod preprocess;
pub mod runner;
pub mod summary;

pub use assembler::ResultAssembler;
pub use orchestrator::{BucketCalculation, CalculationReport, GroupedRecords, Orchestrator};
pub use preprocess::{PreprocessingPipeline, TypedPreprocessingPipeline};
pub use runner::MetricPipeline;
pub use summary::{RunFailure, RunStats, RunSummary};
