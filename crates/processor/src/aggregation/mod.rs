//! Aggregation module for computing statistics over bucket records
//!
//! All aggregators work on exact decimals and support:
//!
//! - **Incremental updates**: Feed values one at a time
//! - **Batch updates**: Feed multiple values at once
//! - **Accumulator merging**: Combine partial results
//! - **Zero values**: An aggregator that saw nothing still finalizes
//!
//! # Available Aggregators
//!
//! - [`CountAggregator`]: Count the number of values
//! - [`SumAggregator`]: Sum all values
//! - [`AverageAggregator`]: Compute the mean
//! - [`MinAggregator`]: Track the minimum value
//! - [`MaxAggregator`]: Track the maximum value
//!
//! [`AggregateCalculator`] exposes each of them as a calculator plugin over
//! one record field.
//!
//! # Examples
//!
//! ```rust
//! use metricflow_processor::aggregation::{Aggregator, SumAggregator};
//! use rust_decimal::Decimal;
//!
//! let mut agg1 = SumAggregator::new();
//! agg1.update_batch(&[Decimal::from(1), Decimal::from(2)]).unwrap();
//!
//! let mut agg2 = SumAggregator::new();
//! agg2.update_batch(&[Decimal::from(3)]).unwrap();
//!
//! agg1.merge(agg2.accumulator()).unwrap();
//! assert_eq!(agg1.finalize().unwrap(), Decimal::from(6));
//! ```

// Re-name to avoid collision with trait
mod trait_;

mod avg;
mod calculator;
mod count;
mod minmax;
mod sum;

pub use trait_::{Aggregator, ToDecimal};

pub use avg::{AverageAccumulator, AverageAggregator};
pub use calculator::{AggregateCalculator, AggregateKind};
pub use count::{CountAccumulator, CountAggregator};
pub use minmax::{MaxAccumulator, MaxAggregator, MinAccumulator, MinAggregator};
pub use sum::{SumAccumulator, SumAggregator};
