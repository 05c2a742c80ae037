//! Grouping and calculation
//!
//! Records are assigned to buckets by their timestamp field, then every
//! calculator is invoked once per bucket. Thread-safe calculators run their
//! buckets on the blocking pool, bounded by a semaphore; all others run
//! strictly in bucket order.

use crate::error::{CalculationError, CalculationResult, RecordError};
use crate::plugin::{Calculator, RecordFailures};
use crate::window::BucketAssigner;
use indexmap::IndexMap;
use metricflow_types::{FieldValue, RawRecord, TimeRange};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Records grouped by bucket
#[derive(Debug, Clone)]
pub struct GroupedRecords {
    buckets: Vec<TimeRange>,
    groups: Vec<Arc<[RawRecord]>>,
    assigned: u64,
    discarded: u64,
}

impl GroupedRecords {
    /// Assign every record to the bucket containing its timestamp
    ///
    /// Records outside all buckets, or whose timestamp field is missing or
    /// not a timestamp, are discarded. The latter are also reported to
    /// `failures`.
    pub fn group<I>(
        buckets: Vec<TimeRange>,
        records: I,
        timestamp_field: &str,
        failures: &RecordFailures,
    ) -> Self
    where
        I: IntoIterator<Item = RawRecord>,
    {
        Self::assign_all(buckets, records, timestamp_field, failures, None).0
    }

    /// Like [`group`](Self::group), but stops pulling records once `cancel`
    /// fires and returns `None`
    pub fn group_until<I>(
        buckets: Vec<TimeRange>,
        records: I,
        timestamp_field: &str,
        failures: &RecordFailures,
        cancel: &CancellationToken,
    ) -> Option<Self>
    where
        I: IntoIterator<Item = RawRecord>,
    {
        match Self::assign_all(buckets, records, timestamp_field, failures, Some(cancel)) {
            (grouped, false) => Some(grouped),
            (_, true) => None,
        }
    }

    fn assign_all<I>(
        buckets: Vec<TimeRange>,
        records: I,
        timestamp_field: &str,
        failures: &RecordFailures,
        cancel: Option<&CancellationToken>,
    ) -> (Self, bool)
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let assigner = BucketAssigner::new(buckets);
        let mut groups: Vec<Vec<RawRecord>> = vec![Vec::new(); assigner.len()];
        let mut assigned = 0u64;
        let mut discarded = 0u64;
        let mut interrupted = false;

        for record in records {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                interrupted = true;
                break;
            }

            let timestamp = match record.get(timestamp_field) {
                Some(FieldValue::Timestamp(ts)) => *ts,
                Some(other) => {
                    failures.push(RecordError::InvalidTimestamp {
                        field: timestamp_field.to_string(),
                        actual: other.field_type().to_string(),
                    });
                    discarded += 1;
                    continue;
                }
                None => {
                    failures.push(RecordError::MissingTimestamp {
                        field: timestamp_field.to_string(),
                    });
                    discarded += 1;
                    continue;
                }
            };

            match assigner.assign(timestamp) {
                Some(idx) => {
                    groups[idx].push(record);
                    assigned += 1;
                }
                None => discarded += 1,
            }
        }

        if discarded > 0 {
            debug!(assigned, discarded, "Discarded records outside all buckets");
        }

        let grouped = Self {
            buckets: assigner.into_buckets(),
            groups: groups.into_iter().map(Arc::from).collect(),
            assigned,
            discarded,
        };
        (grouped, interrupted)
    }

    pub fn buckets(&self) -> &[TimeRange] {
        &self.buckets
    }

    /// Records of the bucket at `idx`
    pub fn records(&self, idx: usize) -> &[RawRecord] {
        &self.groups[idx]
    }

    pub fn assigned(&self) -> u64 {
        self.assigned
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Output of one calculator over one bucket
#[derive(Debug, Clone)]
pub struct BucketCalculation {
    pub bucket: TimeRange,
    pub calculator: String,
    /// Position of the calculator in the metric's calculator list
    pub calculator_index: usize,
    pub record_count: usize,
    pub elapsed: Duration,
    pub output: CalculationResult<IndexMap<String, FieldValue>>,
}

/// Calculations of one run, sorted by bucket start then calculator index
#[derive(Debug, Clone, Default)]
pub struct CalculationReport {
    pub calculations: Vec<BucketCalculation>,
    /// Cancellation stopped new buckets from being issued
    pub cancelled: bool,
}

/// Runs calculators over grouped records
#[derive(Debug, Clone)]
pub struct Orchestrator {
    max_parallelism: usize,
}

impl Orchestrator {
    /// `max_parallelism` of 1 forces sequential execution
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
        }
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Invoke every calculator on every bucket, empty buckets included
    pub async fn calculate(
        &self,
        grouped: &GroupedRecords,
        calculators: &[Arc<dyn Calculator>],
        cancel: &CancellationToken,
    ) -> CalculationReport {
        let mut report = CalculationReport::default();

        for (calculator_index, calculator) in calculators.iter().enumerate() {
            let parallel =
                calculator.is_thread_safe() && self.max_parallelism > 1 && grouped.len() > 1;
            debug!(
                calculator = %calculator.name(),
                buckets = grouped.len(),
                parallel,
                "Calculating buckets"
            );

            let out = &mut report.calculations;
            let completed = if parallel {
                self.calculate_parallel(grouped, calculator, calculator_index, cancel, out)
                    .await
            } else {
                Self::calculate_sequential(grouped, calculator, calculator_index, cancel, out).await
            };

            if !completed {
                warn!(calculator = %calculator.name(), "Cancelled, returning partial results");
                report.cancelled = true;
                break;
            }
        }

        report
            .calculations
            .sort_by(|a, b| (a.bucket, a.calculator_index).cmp(&(b.bucket, b.calculator_index)));
        report
    }

    /// Returns false when cancelled before every bucket was issued
    ///
    /// Buckets run one at a time on the blocking pool, so the executor stays
    /// free to observe cancellation between them.
    async fn calculate_sequential(
        grouped: &GroupedRecords,
        calculator: &Arc<dyn Calculator>,
        calculator_index: usize,
        cancel: &CancellationToken,
        out: &mut Vec<BucketCalculation>,
    ) -> bool {
        for (idx, bucket) in grouped.buckets().iter().copied().enumerate() {
            if cancel.is_cancelled() {
                return false;
            }

            let calculator = Arc::clone(calculator);
            let records = Arc::clone(&grouped.groups[idx]);
            let handle = tokio::task::spawn_blocking(move || {
                compute(calculator.as_ref(), calculator_index, bucket, &records)
            });

            // The in-flight bucket finishes even if cancel fires meanwhile
            match handle.await {
                Ok(calculation) => out.push(calculation),
                Err(e) => error!(bucket = %bucket, error = %e, "Bucket task failed to join"),
            }
        }
        true
    }

    async fn calculate_parallel(
        &self,
        grouped: &GroupedRecords,
        calculator: &Arc<dyn Calculator>,
        calculator_index: usize,
        cancel: &CancellationToken,
        out: &mut Vec<BucketCalculation>,
    ) -> bool {
        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let mut join_set = JoinSet::new();
        let mut completed = true;

        for (idx, bucket) in grouped.buckets().iter().copied().enumerate() {
            if cancel.is_cancelled() {
                completed = false;
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    completed = false;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        completed = false;
                        break;
                    }
                },
            };

            let calculator = Arc::clone(calculator);
            let records = Arc::clone(&grouped.groups[idx]);
            join_set.spawn_blocking(move || {
                let _permit = permit;
                compute(calculator.as_ref(), calculator_index, bucket, &records)
            });
        }

        // In-flight buckets always finish
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(calculation) => out.push(calculation),
                Err(e) => error!(
                    calculator = %calculator.name(),
                    error = %e,
                    "Bucket task failed to join"
                ),
            }
        }

        completed
    }
}

/// Run one calculator on one bucket, catching errors and panics
fn compute(
    calculator: &dyn Calculator,
    calculator_index: usize,
    bucket: TimeRange,
    records: &[RawRecord],
) -> BucketCalculation {
    let started = Instant::now();
    let output = match panic::catch_unwind(AssertUnwindSafe(|| calculator.calculate(records))) {
        Ok(output) => output,
        Err(payload) => Err(CalculationError::Panicked {
            calculator: calculator.name().to_string(),
            reason: panic_message(payload.as_ref()),
        }),
    };
    let elapsed = started.elapsed();

    if let Err(err) = &output {
        error!(bucket = %bucket, error = %err, "Bucket calculation failed");
    }

    BucketCalculation {
        bucket,
        calculator: calculator.name().to_string(),
        calculator_index,
        record_count: records.len(),
        elapsed,
        output,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
