//! Common test doubles for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use metricflow_config::EngineConfig;
use metricflow_processor::error::{CalculationError, CalculationResult, ProcessorError, Result};
use metricflow_processor::plugin::{
    Calculator, Exporter, LoadOptions, Loader, PluginRegistry, RecordStream,
};
use metricflow_types::{FieldValue, FrozenMetricResult, MetricConfig, RawRecord};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const MEMORY: &str = "memory";
pub const RECORDING: &str = "recording";

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn utc_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap()
}

/// Order line with text fields, as a CSV or spreadsheet loader yields them
pub fn order(timestamp: DateTime<Utc>, price: &str, quantity: &str, status: &str) -> RawRecord {
    RawRecord::new()
        .with_field("timestamp", timestamp)
        .with_field("price", price)
        .with_field("quantity", quantity)
        .with_field("status", status)
}

pub fn engine() -> EngineConfig {
    EngineConfig::default().with_timezone("UTC").with_max_parallelism(4)
}

/// Metric over the in-memory source exporting to the recording target
pub fn metric(name: &str, frequency: &str) -> MetricConfig {
    MetricConfig::new(name, frequency)
        .with_source(MEMORY, "mem://orders", "orders")
        .with_target(RECORDING)
}

/// Loader returning a fixed set of records, optionally after a delay
#[derive(Clone)]
pub struct MemoryLoader {
    records: Vec<RawRecord>,
    delay: Option<Duration>,
}

impl MemoryLoader {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    fn source_type(&self) -> &str {
        MEMORY
    }

    async fn load(&self, _options: LoadOptions) -> Result<RecordStream> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Box::new(self.records.clone().into_iter()))
    }
}

/// Loader whose stream yields one record per `interval`, doing its work lazily
#[derive(Clone)]
pub struct TrickleLoader {
    pub records: Vec<RawRecord>,
    pub interval: Duration,
}

#[async_trait]
impl Loader for TrickleLoader {
    fn source_type(&self) -> &str {
        "trickle"
    }

    async fn load(&self, _options: LoadOptions) -> Result<RecordStream> {
        let interval = self.interval;
        Ok(Box::new(self.records.clone().into_iter().inspect(move |_| {
            std::thread::sleep(interval);
        })))
    }
}

/// Exporter keeping every batch it receives
#[derive(Clone, Default)]
pub struct RecordingExporter {
    batches: Arc<Mutex<Vec<Vec<FrozenMetricResult>>>>,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<FrozenMetricResult>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl Exporter for RecordingExporter {
    fn target_type(&self) -> &str {
        RECORDING
    }

    async fn export(&self, results: &[FrozenMetricResult]) -> Result<()> {
        if !results.is_empty() {
            self.batches.lock().push(results.to_vec());
        }
        Ok(())
    }
}

/// Exporter rejecting every batch
pub struct FailingExporter;

#[async_trait]
impl Exporter for FailingExporter {
    fn target_type(&self) -> &str {
        "failing"
    }

    async fn export(&self, _results: &[FrozenMetricResult]) -> Result<()> {
        Err(ProcessorError::Export("warehouse unavailable".to_string()))
    }
}

/// Exporter that cancels the run and never completes
pub struct StallingExporter {
    pub cancel: CancellationToken,
}

#[async_trait]
impl Exporter for StallingExporter {
    fn target_type(&self) -> &str {
        "stalling"
    }

    async fn export(&self, _results: &[FrozenMetricResult]) -> Result<()> {
        self.cancel.cancel();
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Sums the `total` field; thread safety is configurable
pub struct TotalCalculator {
    pub thread_safe: bool,
}

impl Calculator for TotalCalculator {
    fn name(&self) -> &str {
        "total"
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>> {
        let total = records
            .iter()
            .filter_map(|r| r.get("total").and_then(FieldValue::as_decimal))
            .fold(Decimal::ZERO, |acc, v| acc + v);
        let mut out = IndexMap::new();
        out.insert("revenue".to_string(), FieldValue::Decimal(total));
        out.insert("orders".to_string(), FieldValue::from(records.len() as u64));
        Ok(out)
    }
}

/// Fails for buckets holding exactly `bad_count` records
pub struct FailingCalculator {
    pub bad_count: usize,
}

impl Calculator for FailingCalculator {
    fn name(&self) -> &str {
        "failing"
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>> {
        if records.len() == self.bad_count {
            return Err(CalculationError::failed("failing", "refusing this bucket"));
        }
        let mut out = IndexMap::new();
        out.insert("records".to_string(), FieldValue::from(records.len() as u64));
        Ok(out)
    }
}

/// Panics on non-empty buckets
pub struct PanickingCalculator;

impl Calculator for PanickingCalculator {
    fn name(&self) -> &str {
        "panicking"
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>> {
        if !records.is_empty() {
            panic!("calculator bug");
        }
        Ok(IndexMap::new())
    }
}

/// Cancels `cancel` on its `after`-th invocation
pub struct CancellingCalculator {
    pub calls: Arc<Mutex<usize>>,
    pub after: usize,
    pub cancel: CancellationToken,
}

impl Calculator for CancellingCalculator {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>> {
        let mut calls = self.calls.lock();
        *calls += 1;
        if *calls == self.after {
            self.cancel.cancel();
        }
        let mut out = IndexMap::new();
        out.insert("records".to_string(), FieldValue::from(records.len() as u64));
        Ok(out)
    }
}

/// Blocks for `delay` per bucket; never shared across threads
pub struct SlowCalculator {
    pub delay: Duration,
}

impl Calculator for SlowCalculator {
    fn name(&self) -> &str {
        "slow"
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>> {
        std::thread::sleep(self.delay);
        let mut out = IndexMap::new();
        out.insert("records".to_string(), FieldValue::from(records.len() as u64));
        Ok(out)
    }
}

/// Built-in registry with the in-memory loader and a recording exporter
pub fn registry(loader: MemoryLoader) -> (Arc<PluginRegistry>, RecordingExporter) {
    let registry = PluginRegistry::with_builtins();
    let exporter = RecordingExporter::new();

    registry.register_loader(MEMORY, move |_| Ok(Box::new(loader.clone()) as Box<dyn Loader>));
    let sink = exporter.clone();
    registry.register_exporter(RECORDING, move |_| Ok(Box::new(sink.clone()) as Box<dyn Exporter>));
    registry.register_exporter("failing", |_| Ok(Box::new(FailingExporter) as Box<dyn Exporter>));
    registry.register_calculator("total", |_| {
        Ok(Box::new(TotalCalculator { thread_safe: true }) as Box<dyn Calculator>)
    });
    registry.register_calculator("total_serial", |_| {
        Ok(Box::new(TotalCalculator { thread_safe: false }) as Box<dyn Calculator>)
    });
    registry.register_calculator("panicking", |_| {
        Ok(Box::new(PanickingCalculator) as Box<dyn Calculator>)
    });

    (Arc::new(registry), exporter)
}
