use super::trait_::Aggregator;
use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accumulator for average aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AverageAccumulator {
    sum: Decimal,
    count: u64,
}

/// Average aggregator - computes the mean of all values
///
/// The mean of no values is `None`.
///
/// # Examples
///
/// ```
/// use metricflow_processor::aggregation::{Aggregator, AverageAggregator};
/// use rust_decimal::Decimal;
///
/// let mut agg = AverageAggregator::new();
/// agg.update(Decimal::from(10)).unwrap();
/// agg.update(Decimal::from(20)).unwrap();
/// agg.update(Decimal::from(30)).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), Some(Decimal::from(20)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AverageAggregator {
    sum: Decimal,
    count: u64,
}

impl AverageAggregator {
    /// Create a new average aggregator
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for AverageAggregator {
    type Input = Decimal;
    type Output = Option<Decimal>;
    type Accumulator = AverageAccumulator;

    fn update(&mut self, value: Decimal) -> anyhow::Result<()> {
        self.sum = self
            .sum
            .checked_add(value)
            .ok_or_else(|| anyhow!("Average overflow adding {}", value))?;
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<Option<Decimal>> {
        if self.count == 0 {
            return Ok(None);
        }
        self.sum
            .checked_div(Decimal::from(self.count))
            .map(|mean| Some(mean.normalize()))
            .ok_or_else(|| anyhow!("Cannot divide {} by {}", self.sum, self.count))
    }

    fn accumulator(&self) -> AverageAccumulator {
        AverageAccumulator {
            sum: self.sum,
            count: self.count,
        }
    }

    fn merge(&mut self, other: AverageAccumulator) -> anyhow::Result<()> {
        self.sum = self
            .sum
            .checked_add(other.sum)
            .ok_or_else(|| anyhow!("Average overflow merging accumulators"))?;
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
