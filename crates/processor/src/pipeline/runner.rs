//! Metric pipeline runner

use super::assembler::ResultAssembler;
use super::orchestrator::{GroupedRecords, Orchestrator};
use super::preprocess::PreprocessingPipeline;
use super::summary::{RunFailure, RunStats, RunSummary};
use crate::error::{ConfigurationError, LoadError, ProcessorError, Result};
use crate::plugin::{Calculator, LoadOptions, PluginRegistry, RecordStream};
use crate::window::TimeBucketer;
use chrono::{DateTime, Utc};
use metricflow_config::EngineConfig;
use metricflow_types::MetricConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs metric definitions end to end
///
/// One pipeline can serve any number of runs, concurrently or not. Every
/// plugin is resolved at the start of a run, so configuration and
/// resolution errors surface before the loader performs any I/O.
pub struct MetricPipeline {
    registry: Arc<PluginRegistry>,
    engine: EngineConfig,
    bucketer: TimeBucketer,
    orchestrator: Orchestrator,
}

impl MetricPipeline {
    /// Create a pipeline over `registry`
    ///
    /// Fails when the engine configuration is invalid. An unknown timezone
    /// is not an error: runs fall back to the host zone and are reported
    /// as degraded.
    pub fn new(registry: Arc<PluginRegistry>, engine: EngineConfig) -> Result<Self> {
        engine.validate()?;
        let bucketer = TimeBucketer::from_config(&engine)?;
        let orchestrator = Orchestrator::new(engine.max_parallelism);

        info!(
            timezone = %bucketer.zone(),
            week_start = %bucketer.week_start(),
            max_parallelism = orchestrator.max_parallelism(),
            "Metric pipeline ready"
        );

        Ok(Self {
            registry,
            engine,
            bucketer,
            orchestrator,
        })
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn bucketer(&self) -> &TimeBucketer {
        &self.bucketer
    }

    /// Compute `config` over `[start, end)`
    ///
    /// Record and bucket failures are collected in the summary. Only
    /// configuration, plugin resolution and load failures abort the run.
    /// A metric without `target_type` is computed but not exported.
    pub async fn run(
        &self,
        config: &MetricConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let frequency = config.parsed_frequency()?;

        if config.calculators.is_empty() {
            return Err(ConfigurationError::NoCalculators {
                metric: config.name.clone(),
            }
            .into());
        }

        let options = LoadOptions::from_config(config, start, end);
        options.validate(&config.source_type)?;

        let loader = self.registry.create_loader(&config.source_type, config)?;
        let preprocessing = PreprocessingPipeline::build(&self.registry, config)?;
        let mut calculators: Vec<Arc<dyn Calculator>> =
            Vec::with_capacity(config.calculators.len());
        for name in &config.calculators {
            calculators.push(Arc::from(self.registry.create_calculator(name, config)?));
        }
        let exporter = if config.target_type.is_empty() {
            None
        } else {
            Some(self.registry.create_exporter(&config.target_type, config)?)
        };

        let mut failures = Vec::new();
        let degraded = match self.bucketer.degraded() {
            Some(timezone) => {
                warn!(metric = %config.name, timezone = %timezone, "Bucketing in host local zone");
                failures.push(RunFailure::Degraded {
                    reason: format!("unknown timezone {}, bucketing in host local zone", timezone),
                });
                true
            }
            None => false,
        };

        let buckets = self.bucketer.intervals(start, end, frequency);
        info!(
            metric = %config.name,
            source = %config.source_type,
            frequency = %frequency,
            buckets = buckets.len(),
            "Starting metric run"
        );

        let timeout = self.engine.load_timeout();
        let load_started = Instant::now();
        let records = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(metric = %config.name, "Run cancelled during load");
                return Ok(RunSummary {
                    failures,
                    degraded,
                    ..RunSummary::cancelled()
                });
            }
            loaded = tokio::time::timeout(timeout, loader.load(options)) => match loaded {
                Ok(records) => records?,
                Err(_) => return Err(self.load_timeout(config)),
            },
        };

        let loaded = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&loaded);
        let records: RecordStream = Box::new(records.inspect(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        // Draining the stream pulls lazy sources, so it runs on the blocking
        // pool under what is left of the load timeout
        let record_failures = preprocessing.failures();
        let records = preprocessing.process(records);
        let drain = cancel.child_token();
        let grouping = {
            let drain = drain.clone();
            let failures = record_failures.clone();
            let timestamp_field = config.timestamp_field.clone();
            tokio::task::spawn_blocking(move || {
                GroupedRecords::group_until(buckets, records, &timestamp_field, &failures, &drain)
            })
        };
        let remaining = timeout.saturating_sub(load_started.elapsed());
        let grouped = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            joined = tokio::time::timeout(remaining, grouping) => match joined {
                Ok(Ok(grouped)) => grouped,
                Ok(Err(e)) => {
                    error!(metric = %config.name, error = %e, "Reading records failed");
                    return Err(LoadError::Source {
                        source_type: config.source_type.clone(),
                        reason: e.to_string(),
                    }
                    .into());
                }
                Err(_) => {
                    drain.cancel();
                    return Err(self.load_timeout(config));
                }
            },
        };
        let Some(grouped) = grouped else {
            info!(metric = %config.name, "Run cancelled while reading records");
            return Ok(RunSummary {
                failures,
                degraded,
                ..RunSummary::cancelled()
            });
        };

        let report = self.orchestrator.calculate(&grouped, &calculators, &cancel).await;
        let mut cancelled = report.cancelled;
        let (results, bucket_failures) =
            ResultAssembler::new(config, frequency).assemble(report);

        let stats = RunStats {
            records_loaded: loaded.load(Ordering::Relaxed),
            records_processed: grouped.assigned() + grouped.discarded(),
            records_discarded: grouped.discarded(),
            buckets: grouped.len() as u64,
            calculations_succeeded: results.len() as u64,
            calculations_failed: bucket_failures.len() as u64,
        };

        failures.extend(record_failures.take().into_iter().map(RunFailure::Record));
        failures.extend(bucket_failures);

        let exported = match exporter {
            Some(exporter) if !cancelled => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(metric = %config.name, "Run cancelled during export");
                        cancelled = true;
                        false
                    }
                    outcome = exporter.export(&results) => match outcome {
                        Ok(()) => true,
                        Err(e) => {
                            error!(
                                metric = %config.name,
                                target = %config.target_type,
                                error = %e,
                                "Export failed"
                            );
                            failures.push(RunFailure::Export { reason: e.to_string() });
                            false
                        }
                    },
                }
            }
            _ => false,
        };

        info!(
            metric = %config.name,
            results = results.len(),
            failures = failures.len(),
            discarded = stats.records_discarded,
            cancelled,
            exported,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Metric run finished"
        );

        Ok(RunSummary {
            results,
            failures,
            stats,
            cancelled,
            exported,
            degraded,
        })
    }

    fn load_timeout(&self, config: &MetricConfig) -> ProcessorError {
        error!(metric = %config.name, source = %config.source_type, "Load timed out");
        LoadError::Timeout {
            source_type: config.source_type.clone(),
            timeout_ms: self.engine.load_timeout_ms,
        }
        .into()
    }
}
