//! Aggregators exposed as calculator plugins
//!
//! Settings read from the metric definition:
//! - `value_field`: field to aggregate; required except for `count`, which
//!   counts records when it is absent and non-null values otherwise
//! - `output_field`: name of the produced value (defaults to the kind)

use super::{
    Aggregator, AverageAggregator, CountAggregator, MaxAggregator, MinAggregator, SumAggregator,
};
use crate::error::{CalculationError, CalculationResult, ConfigurationError};
use crate::plugin::Calculator;
use indexmap::IndexMap;
use metricflow_types::{FieldValue, MetricConfig, RawRecord};
use rust_decimal::Decimal;
use std::fmt;

/// Built-in aggregation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 5] = [
        AggregateKind::Count,
        AggregateKind::Sum,
        AggregateKind::Average,
        AggregateKind::Min,
        AggregateKind::Max,
    ];

    /// Registered calculator name
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Average => "average",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calculator reducing one numeric field with an [`Aggregator`]
#[derive(Debug, Clone)]
pub struct AggregateCalculator {
    kind: AggregateKind,
    value_field: Option<String>,
    output_field: String,
}

impl AggregateCalculator {
    pub fn new(kind: AggregateKind, value_field: Option<String>) -> Self {
        Self {
            kind,
            value_field,
            output_field: kind.as_str().to_string(),
        }
    }

    pub fn with_output_field(mut self, output_field: impl Into<String>) -> Self {
        self.output_field = output_field.into();
        self
    }

    /// Build from metric settings
    pub fn from_config(
        kind: AggregateKind,
        config: &MetricConfig,
    ) -> Result<Self, ConfigurationError> {
        let value_field = match kind {
            AggregateKind::Count => config
                .setting("value_field")
                .map(|_| config.require_str("value_field").map(str::to_string))
                .transpose()?,
            _ => Some(config.require_str("value_field")?.to_string()),
        };
        let output_field = config.setting_str("output_field", kind.as_str())?.to_string();

        Ok(Self {
            kind,
            value_field,
            output_field,
        })
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    /// Numeric values of the configured field, skipping missing and null
    fn values(&self, field: &str, records: &[RawRecord]) -> CalculationResult<Vec<Decimal>> {
        records
            .iter()
            .filter_map(|record| record.get(field))
            .filter(|value| !value.is_null())
            .map(|value| {
                value.as_decimal().ok_or_else(|| {
                    CalculationError::failed(
                        self.kind.as_str(),
                        format!("field {} holds non-numeric {}", field, value.field_type()),
                    )
                })
            })
            .collect()
    }

    fn aggregate(&self, records: &[RawRecord]) -> anyhow::Result<FieldValue> {
        let field = match (&self.value_field, self.kind) {
            (None, AggregateKind::Count) => return Ok(FieldValue::from(records.len() as u64)),
            (None, _) => anyhow::bail!("no value field configured"),
            (Some(field), _) => field.as_str(),
        };

        if self.kind == AggregateKind::Count {
            let mut agg = CountAggregator::new();
            for value in records.iter().filter_map(|r| r.get(field)).filter(|v| !v.is_null()) {
                agg.update(value.clone())?;
            }
            return Ok(FieldValue::from(agg.finalize()?));
        }

        let values = self.values(field, records)?;
        let value = match self.kind {
            AggregateKind::Sum => {
                let mut agg = SumAggregator::new();
                agg.update_batch(&values)?;
                FieldValue::Decimal(agg.finalize()?)
            }
            AggregateKind::Average => {
                let mut agg = AverageAggregator::new();
                agg.update_batch(&values)?;
                FieldValue::from(agg.finalize()?)
            }
            AggregateKind::Min => {
                let mut agg = MinAggregator::new();
                agg.update_batch(&values)?;
                FieldValue::from(agg.finalize()?)
            }
            AggregateKind::Max => {
                let mut agg = MaxAggregator::new();
                agg.update_batch(&values)?;
                FieldValue::from(agg.finalize()?)
            }
            AggregateKind::Count => FieldValue::from(values.len() as u64),
        };
        Ok(value)
    }
}

impl Calculator for AggregateCalculator {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn calculate(&self, records: &[RawRecord]) -> CalculationResult<IndexMap<String, FieldValue>> {
        let value = self.aggregate(records).map_err(|err| match err.downcast::<CalculationError>() {
            Ok(calc) => calc,
            Err(other) => CalculationError::failed(self.kind.as_str(), other),
        })?;

        let mut output = IndexMap::with_capacity(1);
        output.insert(self.output_field.clone(), value);
        Ok(output)
    }
}
