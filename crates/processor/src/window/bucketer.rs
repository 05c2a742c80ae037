//! Calendar bucketing
//!
//! Splits a `[start, end)` range into contiguous, non-overlapping buckets
//! whose boundaries fall on calendar units of the target zone.
//!
//! ```text
//! month, 2024-01-15 .. 2024-03-10
//!   [01-15, 02-01) [02-01, 03-01) [03-01, 03-10)
//!
//! week (Monday start), Wed 2024-06-05 .. 2024-06-26
//!   [06-05, 06-10) [06-10, 06-17) [06-17, 06-24) [06-24, 06-26)
//! ```

use super::zone::{resolve_local, resolve_zone, TargetZone, ZoneResolution};
use crate::error::ConfigurationError;
use chrono::{
    DateTime, Datelike, Days, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use metricflow_config::EngineConfig;
use metricflow_types::{Frequency, TimeRange};
use tracing::debug;

/// Generates bucket boundaries in a target timezone
#[derive(Debug, Clone)]
pub struct TimeBucketer {
    resolution: ZoneResolution,
    week_start: Weekday,
}

impl TimeBucketer {
    /// Create a bucketer for a zone identifier
    ///
    /// An unknown identifier falls back to the host zone; see [`degraded`](Self::degraded).
    pub fn new(timezone: &str, week_start: Weekday) -> Self {
        Self {
            resolution: resolve_zone(timezone),
            week_start,
        }
    }

    /// Bucketer computing boundaries in UTC with Monday weeks
    pub fn utc() -> Self {
        Self::new("UTC", Weekday::Mon)
    }

    /// Build from engine configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigurationError> {
        let week_start = config.week_start_day()?;
        Ok(Self::new(&config.timezone, week_start))
    }

    pub fn zone(&self) -> TargetZone {
        self.resolution.zone
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// The unresolved zone identifier when running on the local fallback
    pub fn degraded(&self) -> Option<&str> {
        self.resolution.fallback_from.as_deref()
    }

    /// Partition `[start, end)` into buckets
    ///
    /// Returns an empty sequence when `start >= end`.
    pub fn intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        frequency: Frequency,
    ) -> Vec<TimeRange> {
        let buckets = match self.resolution.zone {
            TargetZone::Named(tz) => partition(&tz, start, end, frequency, self.week_start),
            TargetZone::Local => partition(&Local, start, end, frequency, self.week_start),
        };

        debug!(
            zone = %self.resolution.zone,
            frequency = %frequency,
            buckets = buckets.len(),
            "Generated buckets"
        );

        buckets
    }

    /// Partition `[start, end)` using a frequency token
    pub fn intervals_for(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        frequency: &str,
    ) -> Result<Vec<TimeRange>, ConfigurationError> {
        let frequency: Frequency = frequency.parse()?;
        Ok(self.intervals(start, end, frequency))
    }
}

fn partition<T: TimeZone>(
    tz: &T,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    frequency: Frequency,
    week_start: Weekday,
) -> Vec<TimeRange> {
    let mut buckets = Vec::new();
    if start >= end {
        return buckets;
    }

    let end_local = end.with_timezone(tz);
    let mut current = start.with_timezone(tz);

    while current < end_local {
        let boundary = next_boundary(tz, &current, frequency, week_start);
        let next = if boundary > end_local {
            end_local.clone()
        } else {
            boundary
        };

        match TimeRange::from_zoned(current.clone(), next.clone()) {
            Ok(bucket) => buckets.push(bucket),
            Err(_) => break,
        }
        current = next;
    }

    buckets
}

/// First boundary strictly after `current`
fn next_boundary<T: TimeZone>(
    tz: &T,
    current: &DateTime<T>,
    frequency: Frequency,
    week_start: Weekday,
) -> DateTime<T> {
    let local = current.naive_local();

    let candidate = match frequency {
        Frequency::Day => local
            .checked_add_days(Days::new(1))
            .map(|naive| resolve_local(tz, naive)),
        Frequency::Week => {
            let date = local.date();
            let ahead = (7 + week_start.num_days_from_monday() as i64
                - date.weekday().num_days_from_monday() as i64)
                % 7;
            let ahead = if ahead == 0 { 7 } else { ahead };
            date.checked_add_days(Days::new(ahead as u64))
                .map(|d| resolve_local(tz, d.and_time(NaiveTime::MIN)))
        }
        Frequency::Month => first_of_next_month(local.date())
            .map(|d| resolve_local(tz, d.and_time(NaiveTime::MIN))),
    };

    match candidate {
        Some(boundary) if boundary > *current => boundary,
        // Calendar overflow or a boundary folded back by a DST transition
        _ => current.clone() + Duration::days(1),
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}
