//! Result assembly

use super::orchestrator::CalculationReport;
use super::summary::RunFailure;
use metricflow_types::{Frequency, FrozenMetricResult, MetricConfig, MetricValue};
use tracing::debug;

/// Turns bucket calculations into frozen results
///
/// Successful calculations become one [`FrozenMetricResult`] each; failed
/// ones become [`RunFailure::Bucket`] entries and produce no result.
pub struct ResultAssembler<'a> {
    config: &'a MetricConfig,
    frequency: Frequency,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(config: &'a MetricConfig, frequency: Frequency) -> Self {
        Self { config, frequency }
    }

    /// Results keep the report order: bucket start, then calculator order
    pub fn assemble(
        &self,
        report: CalculationReport,
    ) -> (Vec<FrozenMetricResult>, Vec<RunFailure>) {
        let mut results = Vec::with_capacity(report.calculations.len());
        let mut failures = Vec::new();

        for calculation in report.calculations {
            match calculation.output {
                Ok(outputs) => results.push(FrozenMetricResult::new(
                    self.config.name.clone(),
                    self.config.id,
                    calculation.calculator,
                    MetricValue::from_outputs(outputs),
                    self.config.unit.clone(),
                    calculation.bucket,
                    self.frequency,
                    calculation.record_count,
                    calculation.elapsed,
                )),
                Err(error) => failures.push(RunFailure::Bucket {
                    bucket: calculation.bucket,
                    calculator: calculation.calculator,
                    error,
                }),
            }
        }

        debug!(
            metric = %self.config.name,
            results = results.len(),
            failed = failures.len(),
            "Assembled results"
        );

        (results, failures)
    }
}
