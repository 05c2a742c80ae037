use super::trait_::Aggregator;

use serde::{Deserialize, Serialize};

/// Accumulator for count aggregation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountAccumulator {
    count: u64,
}

/// Count aggregator - counts the number of values
///
/// This is the simplest aggregator, it just counts how many values have been processed.
///
/// # Examples
///
/// ```
/// use metricflow_processor::aggregation::{Aggregator, CountAggregator};
///
/// let mut agg = CountAggregator::new();
/// agg.update("a").unwrap();
/// agg.update("b").unwrap();
///
/// assert_eq!(agg.finalize().unwrap(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CountAggregator<T> {
    count: u64,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<T: Clone> CountAggregator<T> {
    /// Create a new count aggregator
    pub fn new() -> Self {
        Self {
            count: 0,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Clone> Default for CountAggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + std::fmt::Debug> Aggregator for CountAggregator<T> {
    type Input = T;
    type Output = u64;
    type Accumulator = CountAccumulator;

    fn update(&mut self, _value: T) -> anyhow::Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finalize(&self) -> anyhow::Result<u64> {
        Ok(self.count)
    }

    fn accumulator(&self) -> CountAccumulator {
        CountAccumulator { count: self.count }
    }

    fn merge(&mut self, other: CountAccumulator) -> anyhow::Result<()> {
        self.count += other.count;
        Ok(())
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn count(&self) -> u64 {
        self.count
    }
}
