//! Built-in plugins
//!
//! | category     | name                                   |
//! |--------------|----------------------------------------|
//! | preprocessor | `PriceTotal`, `FieldFilter`            |
//! | calculator   | `count`, `sum`, `average`, `min`, `max`|
//! | converter    | `int`, `decimal`, `datetime`, `string` |
//!
//! All of them can be replaced by registering another factory under the
//! same name.

use super::convert;
use super::{Calculator, Disposition, PluginRegistry, UntypedPreprocessor};
use crate::aggregation::{AggregateCalculator, AggregateKind};
use crate::error::{ConfigurationError, RecordError, RecordResult};
use metricflow_types::{FieldValue, MetricConfig, RawRecord};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

pub const PRICE_TOTAL: &str = "PriceTotal";
pub const FIELD_FILTER: &str = "FieldFilter";

/// Register every built-in plugin into `registry`
pub fn register_builtins(registry: &PluginRegistry) {
    registry.register_preprocessor(PRICE_TOTAL, |config| {
        Ok(Box::new(PriceTotal::from_config(config)?) as Box<dyn UntypedPreprocessor>)
    });
    registry.register_preprocessor(FIELD_FILTER, |config| {
        Ok(Box::new(FieldFilter::from_config(config)?) as Box<dyn UntypedPreprocessor>)
    });

    for kind in AggregateKind::ALL {
        registry.register_calculator(kind.as_str(), move |config| {
            Ok(Box::new(AggregateCalculator::from_config(kind, config)?) as Box<dyn Calculator>)
        });
    }

    for (token, converter) in convert::BUILTIN_CONVERTERS {
        registry.register_converter(token, converter);
    }
}

/// Computes `total = price * quantity` on every record
///
/// Field names come from the `price_field`, `quantity_field` and
/// `total_field` settings.
#[derive(Debug, Clone)]
pub struct PriceTotal {
    price_field: String,
    quantity_field: String,
    total_field: String,
}

impl PriceTotal {
    pub fn new(
        price_field: impl Into<String>,
        quantity_field: impl Into<String>,
        total_field: impl Into<String>,
    ) -> Self {
        Self {
            price_field: price_field.into(),
            quantity_field: quantity_field.into(),
            total_field: total_field.into(),
        }
    }

    pub fn from_config(config: &MetricConfig) -> Result<Self, ConfigurationError> {
        Ok(Self::new(
            config.setting_str("price_field", "price")?,
            config.setting_str("quantity_field", "quantity")?,
            config.setting_str("total_field", "total")?,
        ))
    }

    fn numeric(&self, record: &RawRecord, field: &str) -> RecordResult<Decimal> {
        let value = record
            .get(field)
            .ok_or_else(|| self.failure(format!("missing field {}", field)))?;
        value.as_decimal().ok_or_else(|| {
            self.failure(format!("field {} holds non-numeric {}", field, value.field_type()))
        })
    }

    fn failure(&self, reason: String) -> RecordError {
        RecordError::Preprocessor {
            preprocessor: PRICE_TOTAL.to_string(),
            reason,
        }
    }
}

impl UntypedPreprocessor for PriceTotal {
    fn name(&self) -> &str {
        PRICE_TOTAL
    }

    fn process(&mut self, record: &mut RawRecord) -> RecordResult<Disposition> {
        let price = self.numeric(record, &self.price_field)?;
        let quantity = self.numeric(record, &self.quantity_field)?;
        let total = price
            .checked_mul(quantity)
            .ok_or_else(|| self.failure(format!("{} * {} overflows", price, quantity)))?;

        record.insert(self.total_field.clone(), total);
        Ok(Disposition::Keep)
    }
}

/// Keeps records whose field equals one of the configured values
///
/// Settings: `filter_field` and `filter_values` (a scalar or a list).
/// Numbers compare by value, so `1` matches `1.0`. Records without the
/// field are dropped.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    field: String,
    accepted: Vec<FieldValue>,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, accepted: Vec<FieldValue>) -> Self {
        Self {
            field: field.into(),
            accepted,
        }
    }

    pub fn from_config(config: &MetricConfig) -> Result<Self, ConfigurationError> {
        let field = config.require_str("filter_field")?.to_string();
        let accepted = match config.setting("filter_values") {
            Some(serde_json::Value::Array(items)) => {
                items.iter().map(json_to_field).collect::<Result<_, _>>()?
            }
            Some(value) => vec![json_to_field(value)?],
            None => {
                return Err(ConfigurationError::InvalidSetting(
                    "filter_values is required for FieldFilter".to_string(),
                ))
            }
        };
        Ok(Self::new(field, accepted))
    }

    fn matches(&self, value: &FieldValue) -> bool {
        self.accepted.iter().any(|accepted| match (accepted.as_decimal(), value.as_decimal()) {
            (Some(a), Some(b)) => a == b,
            _ => accepted == value,
        })
    }
}

impl UntypedPreprocessor for FieldFilter {
    fn name(&self) -> &str {
        FIELD_FILTER
    }

    fn process(&mut self, record: &mut RawRecord) -> RecordResult<Disposition> {
        match record.get(&self.field) {
            Some(value) if self.matches(value) => Ok(Disposition::Keep),
            _ => Ok(Disposition::Drop),
        }
    }
}

fn json_to_field(value: &serde_json::Value) -> Result<FieldValue, ConfigurationError> {
    match value {
        serde_json::Value::Null => Ok(FieldValue::Null),
        serde_json::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
        serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(FieldValue::Int(i))
            } else {
                n.as_f64()
                    .and_then(Decimal::from_f64)
                    .map(FieldValue::Decimal)
                    .ok_or_else(|| {
                        ConfigurationError::InvalidSetting(format!(
                            "filter value {} is out of range",
                            n
                        ))
                    })
            }
        }
        other => Err(ConfigurationError::InvalidSetting(format!(
            "filter value {} is not a scalar",
            other
        ))),
    }
}
