//! Time ranges and calendar frequencies
//!
//! [`TimeRange`] is used both for the overall computation window and for the
//! individual buckets produced by the bucketer.

use crate::errors::{Result, TypesError};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Half-open interval `[start, end)` expressed in one resolved timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeRangeRepr")]
pub struct TimeRange {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

#[derive(Deserialize)]
struct TimeRangeRepr {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

impl TryFrom<TimeRangeRepr> for TimeRange {
    type Error = TypesError;

    fn try_from(repr: TimeRangeRepr) -> Result<Self> {
        TimeRange::new(repr.start, repr.end)
    }
}

impl TimeRange {
    /// Create a range, rejecting empty or inverted intervals
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Result<Self> {
        if start >= end {
            return Err(TypesError::InvalidTimeRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Create a range from UTC instants
    pub fn from_utc(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Self::new(start.fixed_offset(), end.fixed_offset())
    }

    /// Create a range from instants in any zone, keeping each endpoint's offset
    pub fn from_zoned<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        Self::new(start.fixed_offset(), end.fixed_offset())
    }

    /// Start of the range (inclusive)
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    /// End of the range (exclusive)
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }

    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    /// Half-open containment: `start <= ts < end`
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start_utc() && timestamp < self.end_utc()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` begins exactly where this range ends
    pub fn is_followed_by(&self, other: &TimeRange) -> bool {
        self.end == other.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M:%S%:z"),
            self.end.format("%Y-%m-%d %H:%M:%S%:z")
        )
    }
}

impl PartialOrd for TimeRange {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeRange {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

/// Calendar granularity used to generate buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Day,
    Week,
    Month,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Day => "day",
            Frequency::Week => "week",
            Frequency::Month => "month",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Frequency::Day),
            "week" => Ok(Frequency::Week),
            "month" => Ok(Frequency::Month),
            _ => Err(TypesError::UnsupportedFrequency(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_range_rejects_empty_and_inverted() {
        assert!(TimeRange::from_utc(utc(2024, 1, 1), utc(2024, 1, 1)).is_err());
        assert!(TimeRange::from_utc(utc(2024, 1, 2), utc(2024, 1, 1)).is_err());
        assert!(TimeRange::from_utc(utc(2024, 1, 1), utc(2024, 1, 2)).is_ok());
    }

    #[test]
    fn test_half_open_containment() {
        let range = TimeRange::from_utc(utc(2024, 1, 1), utc(2024, 1, 2)).unwrap();
        assert!(range.contains(utc(2024, 1, 1)));
        assert!(range.contains(utc(2024, 1, 1) + Duration::hours(23)));
        assert!(!range.contains(utc(2024, 1, 2)));
        assert!(!range.contains(utc(2023, 12, 31)));
    }

    #[test]
    fn test_containment_across_offsets() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = plus_two.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = plus_two.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, end).unwrap();

        // 2023-12-31T22:00Z is local midnight at +02:00
        assert!(range.contains(Utc.with_ymd_and_hms(2023, 12, 31, 22, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2023, 12, 31, 21, 59, 59).unwrap()));
    }

    #[test]
    fn test_ordering_and_adjacency() {
        let a = TimeRange::from_utc(utc(2024, 1, 1), utc(2024, 1, 2)).unwrap();
        let b = TimeRange::from_utc(utc(2024, 1, 2), utc(2024, 1, 3)).unwrap();
        assert!(a < b);
        assert!(a.is_followed_by(&b));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_deserialize_enforces_invariant() {
        let ok = r#"{"start":"2024-01-01T00:00:00+00:00","end":"2024-01-02T00:00:00+00:00"}"#;
        let bad = r#"{"start":"2024-01-02T00:00:00+00:00","end":"2024-01-01T00:00:00+00:00"}"#;
        assert!(serde_json::from_str::<TimeRange>(ok).is_ok());
        assert!(serde_json::from_str::<TimeRange>(bad).is_err());
    }

    #[test]
    fn test_frequency_parsing() {
        assert_eq!("day".parse::<Frequency>().unwrap(), Frequency::Day);
        assert_eq!(" Week ".parse::<Frequency>().unwrap(), Frequency::Week);
        assert_eq!("MONTH".parse::<Frequency>().unwrap(), Frequency::Month);
        assert_eq!(
            "hour".parse::<Frequency>().unwrap_err(),
            TypesError::UnsupportedFrequency("hour".to_string())
        );
    }
}
