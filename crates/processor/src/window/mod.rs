//! Calendar bucketing
//!
//! A computation window `[start, end)` is split into buckets aligned to
//! calendar units of a target timezone:
//!
//! ```text
//! day:    [start, +1 day) [+1 day, +2 days) ...
//! week:   [start, next week start) [.., +7 days) ... [.., end)
//! month:  [start, 1st of next month) [1st, 1st) ... [.., end)
//! ```
//!
//! The first bucket starts exactly at `start` and the last one ends exactly at
//! `end`; buckets are contiguous and never overlap. Records are then mapped to
//! buckets with a [`BucketAssigner`].

pub mod assigner;
pub mod bucketer;
pub mod zone;

pub use assigner::BucketAssigner;
pub use bucketer::TimeBucketer;
pub use zone::{resolve_zone, TargetZone, ZoneResolution};
