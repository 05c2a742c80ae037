//! Dynamically-typed scalar values carried by records

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Null,
    Bool,
    Int,
    Decimal,
    Text,
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Decimal => "decimal",
            FieldType::Text => "text",
            FieldType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A single scalar value inside a [`RawRecord`](crate::RawRecord)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// The semantic type of this value
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Null => FieldType::Null,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Decimal(_) => FieldType::Decimal,
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; decimals are accepted only when they have no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Numeric view of ints and decimals
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Int(i) => Some(Decimal::from(*i)),
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Build a decimal value from a float, `Null` when the float is not finite
    pub fn from_f64(value: f64) -> Self {
        Decimal::from_f64(value)
            .map(FieldValue::Decimal)
            .unwrap_or(FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(FieldValue::Int)
            .unwrap_or_else(|_| FieldValue::Decimal(Decimal::from(value)))
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_numeric_views() {
        assert_eq!(FieldValue::Int(7).as_decimal(), Some(Decimal::from(7)));
        assert_eq!(FieldValue::Decimal(Decimal::new(250, 2)).as_f64(), Some(2.5));
        assert_eq!(FieldValue::Decimal(Decimal::new(300, 2)).as_i64(), Some(3));
        assert_eq!(FieldValue::Decimal(Decimal::new(301, 2)).as_i64(), None);
        assert_eq!(FieldValue::Text("7".into()).as_decimal(), None);
    }

    #[test]
    fn test_field_type_and_display() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        let value = FieldValue::from(ts);
        assert_eq!(value.field_type(), FieldType::Timestamp);
        assert_eq!(value.to_string(), "2024-01-15T08:00:00+00:00");
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert!(FieldValue::from_f64(f64::NAN).is_null());
        assert_eq!(FieldValue::from_f64(1.5), FieldValue::Decimal(Decimal::new(15, 1)));
    }
}
