//! Value converters
//!
//! A converter coerces one field value to another type. Metrics declare
//! `property -> token` pairs; tokens resolve to converters in the registry.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metricflow_types::FieldValue;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Converter function registered under a token
pub type Converter = dyn Fn(&FieldValue) -> Result<FieldValue, String> + Send + Sync;

/// Converters registered by [`PluginRegistry::with_builtins`](super::PluginRegistry::with_builtins)
pub const BUILTIN_CONVERTERS: [(&str, fn(&FieldValue) -> Result<FieldValue, String>); 4] = [
    ("int", to_int),
    ("decimal", to_decimal),
    ("datetime", to_datetime),
    ("string", to_string),
];

/// Coerce to a 64-bit integer
pub fn to_int(value: &FieldValue) -> Result<FieldValue, String> {
    match value {
        FieldValue::Null => Ok(FieldValue::Null),
        FieldValue::Int(i) => Ok(FieldValue::Int(*i)),
        FieldValue::Bool(b) => Ok(FieldValue::Int(i64::from(*b))),
        FieldValue::Decimal(d) => {
            if d.fract().is_zero() {
                d.to_i64()
                    .map(FieldValue::Int)
                    .ok_or_else(|| format!("{} is out of range", d))
            } else {
                Err(format!("{} has a fractional part", d))
            }
        }
        FieldValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|e| format!("'{}': {}", s, e)),
        FieldValue::Timestamp(ts) => Ok(FieldValue::Int(ts.timestamp())),
    }
}

/// Coerce to an exact decimal
pub fn to_decimal(value: &FieldValue) -> Result<FieldValue, String> {
    match value {
        FieldValue::Null => Ok(FieldValue::Null),
        FieldValue::Int(i) => Ok(FieldValue::Decimal(Decimal::from(*i))),
        FieldValue::Decimal(d) => Ok(FieldValue::Decimal(*d)),
        FieldValue::Text(s) => {
            let trimmed = s.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(FieldValue::Decimal)
                .map_err(|e| format!("'{}': {}", s, e))
        }
        other => Err(format!("cannot convert {} to decimal", other.field_type())),
    }
}

/// Coerce to a UTC timestamp
///
/// Text is accepted as RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) or a
/// bare date at midnight UTC. Integers are Unix seconds.
pub fn to_datetime(value: &FieldValue) -> Result<FieldValue, String> {
    match value {
        FieldValue::Null => Ok(FieldValue::Null),
        FieldValue::Timestamp(ts) => Ok(FieldValue::Timestamp(*ts)),
        FieldValue::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)
            .map(FieldValue::Timestamp)
            .ok_or_else(|| format!("{} is out of range", secs)),
        FieldValue::Text(s) => parse_datetime(s.trim())
            .map(FieldValue::Timestamp)
            .ok_or_else(|| format!("'{}' is not a recognised timestamp", s)),
        other => Err(format!("cannot convert {} to timestamp", other.field_type())),
    }
}

/// Render any value as text
pub fn to_string(value: &FieldValue) -> Result<FieldValue, String> {
    match value {
        FieldValue::Null => Ok(FieldValue::Null),
        FieldValue::Text(s) => Ok(FieldValue::Text(s.clone())),
        FieldValue::Timestamp(ts) => Ok(FieldValue::Text(ts.to_rfc3339())),
        other => Ok(FieldValue::Text(other.to_string())),
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
