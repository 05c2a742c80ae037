use metricflow_types::FieldValue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Core trait for all aggregators
///
/// This trait defines the interface for incremental aggregation with support for:
/// - Incremental updates (feed values one at a time)
/// - Accumulator merging (combine partial aggregates of one bucket)
/// - State serialization
pub trait Aggregator: Send + Sync + Debug {
    /// The type of values this aggregator accepts
    type Input: Clone;

    /// The type of the final aggregation result
    type Output: Clone;

    /// The type of the internal accumulator state (must be serializable)
    type Accumulator: Clone + Serialize + for<'de> Deserialize<'de>;

    /// Update the aggregator with a new value
    fn update(&mut self, value: Self::Input) -> anyhow::Result<()>;

    /// Update with multiple values at once
    fn update_batch(&mut self, values: &[Self::Input]) -> anyhow::Result<()> {
        for value in values {
            self.update(value.clone())?;
        }
        Ok(())
    }

    /// Compute the final aggregation result
    ///
    /// An aggregator that has seen no values returns its zero value.
    fn finalize(&self) -> anyhow::Result<Self::Output>;

    /// Get the current accumulator state
    fn accumulator(&self) -> Self::Accumulator;

    /// Merge another accumulator into this one
    fn merge(&mut self, other: Self::Accumulator) -> anyhow::Result<()>;

    /// Reset the aggregator to initial state
    fn reset(&mut self);

    /// Get the number of values processed so far
    fn count(&self) -> u64;

    /// Check if the aggregator has processed any values
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Numeric view of a field value for decimal aggregations
pub trait ToDecimal {
    fn to_decimal(&self) -> Option<Decimal>;
}

impl ToDecimal for Decimal {
    fn to_decimal(&self) -> Option<Decimal> {
        Some(*self)
    }
}

impl ToDecimal for i64 {
    fn to_decimal(&self) -> Option<Decimal> {
        Some(Decimal::from(*self))
    }
}

impl ToDecimal for FieldValue {
    fn to_decimal(&self) -> Option<Decimal> {
        self.as_decimal()
    }
}
