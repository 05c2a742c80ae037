use super::trait_::Aggregator;
use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accumulator for sum aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SumAccumulator {
    sum: Decimal,
    count: u64,
}

/// Sum aggregator - computes the exact decimal sum of all values
///
/// Useful for totals such as revenue or quantities. The sum of no values is zero.
///
/// # Examples
///
/// ```
/// use metricflow_processor::aggregation::{Aggregator, SumAggregator};
/// use rust_decimal::Decimal;
///
/// let mut agg = SumAggregator::new();
/// agg.update(Decimal::new(150, 2)).unwrap();
/// agg.update(Decimal::new(250, 2)).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), Decimal::from(4));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SumAggregator {
    sum: Decimal,
    count: u64,
}

impl SumAggregator {
    /// Create a new sum aggregator
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for SumAggregator {
    type Input = Decimal;
    type Output = Decimal;
    type Accumulator = SumAccumulator;

    fn update(&mut self, value: Decimal) -> anyhow::Result<()> {
        self.sum = self
            .sum
            .checked_add(value)
            .ok_or_else(|| anyhow!("Sum overflow adding {}", value))?;
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<Decimal> {
        Ok(self.sum)
    }

    fn accumulator(&self) -> SumAccumulator {
        SumAccumulator {
            sum: self.sum,
            count: self.count,
        }
    }

    fn merge(&mut self, other: SumAccumulator) -> anyhow::Result<()> {
        self.sum = self
            .sum
            .checked_add(other.sum)
            .ok_or_else(|| anyhow!("Sum overflow merging accumulators"))?;
        self.count += other.count;
        Ok(())
    }

    fn reset(&mut self) {
        self.sum = Decimal::ZERO;
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}
