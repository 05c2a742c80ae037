use super::trait_::Aggregator;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Accumulator for min aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinAccumulator {
    min: Option<Decimal>,
    count: u64,
}

/// Accumulator for max aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaxAccumulator {
    max: Option<Decimal>,
    count: u64,
}

/// Min aggregator - tracks the minimum value seen
///
/// # Examples
///
/// ```
/// use metricflow_processor::aggregation::{Aggregator, MinAggregator};
/// use rust_decimal::Decimal;
///
/// let mut agg = MinAggregator::new();
/// agg.update(Decimal::from(30)).unwrap();
/// agg.update(Decimal::from(10)).unwrap();
/// agg.update(Decimal::from(20)).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), Some(Decimal::from(10)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MinAggregator {
    min: Option<Decimal>,
    count: u64,
}

impl MinAggregator {
    /// Create a new min aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current minimum value
    pub fn min(&self) -> Option<Decimal> {
        self.min
    }
}

impl Aggregator for MinAggregator {
    type Input = Decimal;
    type Output = Option<Decimal>;
    type Accumulator = MinAccumulator;

    fn update(&mut self, value: Decimal) -> anyhow::Result<()> {
        self.min = Some(match self.min {
            Some(current) => current.min(value),
            None => value,
        });
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<Option<Decimal>> {
        Ok(self.min)
    }

    fn accumulator(&self) -> MinAccumulator {
        MinAccumulator {
            min: self.min,
            count: self.count,
        }
    }

    fn merge(&mut self, other: MinAccumulator) -> anyhow::Result<()> {
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.count += other.count;
        Ok(())
    }

    fn reset(&mut self) {
        self.min = None;
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}

/// Max aggregator - tracks the maximum value seen
///
/// # Examples
///
/// ```
/// use metricflow_processor::aggregation::{Aggregator, MaxAggregator};
/// use rust_decimal::Decimal;
///
/// let mut agg = MaxAggregator::new();
/// agg.update(Decimal::from(10)).unwrap();
/// agg.update(Decimal::from(30)).unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), Some(Decimal::from(30)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MaxAggregator {
    max: Option<Decimal>,
    count: u64,
}

impl MaxAggregator {
    /// Create a new max aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current maximum value
    pub fn max(&self) -> Option<Decimal> {
        self.max
    }
}

impl Aggregator for MaxAggregator {
    type Input = Decimal;
    type Output = Option<Decimal>;
    type Accumulator = MaxAccumulator;

    fn update(&mut self, value: Decimal) -> anyhow::Result<()> {
        self.max = Some(match self.max {
            Some(current) => current.max(value),
            None => value,
        });
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<Option<Decimal>> {
        Ok(self.max)
    }

    fn accumulator(&self) -> MaxAccumulator {
        MaxAccumulator {
            max: self.max,
            count: self.count,
        }
    }

    fn merge(&mut self, other: MaxAccumulator) -> anyhow::Result<()> {
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.count += other.count;
        Ok(())
    }

    fn reset(&mut self) {
        self.max = None;
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_basic() {
        let values = [Decimal::from(5), Decimal::new(-15, 1), Decimal::from(12)];

        let mut min = MinAggregator::new();
        let mut max = MaxAggregator::new();
        min.update_batch(&values).unwrap();
        max.update_batch(&values).unwrap();

        assert_eq!(min.finalize().unwrap(), Some(Decimal::new(-15, 1)));
        assert_eq!(max.finalize().unwrap(), Some(Decimal::from(12)));
    }

    #[test]
    fn test_empty_min_max_is_none() {
        assert_eq!(MinAggregator::new().finalize().unwrap(), None);
        assert_eq!(MaxAggregator::new().finalize().unwrap(), None);
    }

    #[test]
    fn test_merge_with_empty_accumulator() {
        let mut min = MinAggregator::new();
        min.merge(MinAggregator::new().accumulator()).unwrap();
        assert_eq!(min.min(), None);

        let mut other = MinAggregator::new();
        other.update(Decimal::from(3)).unwrap();
        min.merge(other.accumulator()).unwrap();
        assert_eq!(min.min(), Some(Decimal::from(3)));

        let mut max = MaxAggregator::new();
        max.update(Decimal::from(1)).unwrap();
        max.merge(MaxAggregator::new().accumulator()).unwrap();
        assert_eq!(max.max(), Some(Decimal::from(1)));
        assert_eq!(max.count(), 1);

        max.reset();
        assert!(max.is_empty());
    }
}
