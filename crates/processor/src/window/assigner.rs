//! Bucket assignment
//!
//! Buckets produced by the bucketer are sorted and contiguous, so each
//! timestamp belongs to at most one of them and can be found by binary search.
//!
//! ```text
//! Buckets:   [01-15, 02-01) [02-01, 03-01) [03-01, 03-10)
//! 02-14 ->                   ^ bucket 1
//! 03-10 ->   outside (end is exclusive)
//! ```

use chrono::{DateTime, Utc};
use metricflow_types::TimeRange;

/// Assigns timestamps to one of a set of sorted, non-overlapping buckets
#[derive(Debug, Clone)]
pub struct BucketAssigner {
    buckets: Vec<TimeRange>,
}

impl BucketAssigner {
    /// Create an assigner; buckets are sorted by start
    pub fn new(mut buckets: Vec<TimeRange>) -> Self {
        buckets.sort();
        Self { buckets }
    }

    /// Index of the bucket containing `timestamp`, if any
    pub fn assign(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        let idx = self
            .buckets
            .partition_point(|bucket| bucket.start_utc() <= timestamp);
        if idx == 0 {
            return None;
        }

        let candidate = idx - 1;
        if self.buckets[candidate].contains(timestamp) {
            Some(candidate)
        } else {
            None
        }
    }

    pub fn buckets(&self) -> &[TimeRange] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<TimeRange> {
        self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn assigner() -> BucketAssigner {
        BucketAssigner::new(vec![
            TimeRange::from_utc(day(3), day(5)).unwrap(),
            TimeRange::from_utc(day(1), day(3)).unwrap(),
            TimeRange::from_utc(day(5), day(8)).unwrap(),
        ])
    }

    #[test]
    fn test_buckets_are_sorted() {
        let assigner = assigner();
        let starts: Vec<_> = assigner.buckets().iter().map(|b| b.start_utc()).collect();
        assert_eq!(starts, vec![day(1), day(3), day(5)]);
    }

    #[test]
    fn test_assign_inside_and_on_boundaries() {
        let assigner = assigner();
        assert_eq!(assigner.assign(day(1)), Some(0));
        assert_eq!(assigner.assign(day(2) + Duration::hours(7)), Some(0));
        assert_eq!(assigner.assign(day(3)), Some(1));
        assert_eq!(assigner.assign(day(8) - Duration::nanoseconds(1)), Some(2));
    }

    #[test]
    fn test_assign_outside_range() {
        let assigner = assigner();
        assert_eq!(assigner.assign(day(1) - Duration::seconds(1)), None);
        assert_eq!(assigner.assign(day(8)), None);
        assert_eq!(assigner.assign(day(20)), None);
    }

    #[test]
    fn test_assign_with_gap_between_buckets() {
        let assigner = BucketAssigner::new(vec![
            TimeRange::from_utc(day(1), day(2)).unwrap(),
            TimeRange::from_utc(day(4), day(5)).unwrap(),
        ]);
        assert_eq!(assigner.assign(day(3)), None);
        assert_eq!(assigner.assign(day(4)), Some(1));
    }

    #[test]
    fn test_empty_assigner() {
        let assigner = BucketAssigner::new(Vec::new());
        assert!(assigner.is_empty());
        assert_eq!(assigner.assign(day(1)), None);
    }
}
