//! Target timezone resolution
//!
//! Calendar boundaries are computed in a target zone. An identifier that does
//! not name an IANA zone degrades to the host's local zone instead of failing
//! the run.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::fmt;
use tracing::warn;

/// Zone in which bucket boundaries are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetZone {
    /// A resolved IANA zone
    Named(Tz),
    /// The host's local zone
    Local,
}

impl fmt::Display for TargetZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetZone::Named(tz) => write!(f, "{}", tz.name()),
            TargetZone::Local => f.write_str("local"),
        }
    }
}

/// Outcome of resolving a configured zone identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneResolution {
    pub zone: TargetZone,
    /// The identifier that failed to resolve, when the local fallback was used
    pub fallback_from: Option<String>,
}

impl ZoneResolution {
    pub fn is_degraded(&self) -> bool {
        self.fallback_from.is_some()
    }
}

/// Resolve a zone identifier, falling back to the local zone with a warning
pub fn resolve_zone(identifier: &str) -> ZoneResolution {
    match identifier.trim().parse::<Tz>() {
        Ok(tz) => ZoneResolution {
            zone: TargetZone::Named(tz),
            fallback_from: None,
        },
        Err(reason) => {
            warn!(
                timezone = %identifier,
                reason = %reason,
                "Unknown timezone, falling back to host local zone"
            );
            ZoneResolution {
                zone: TargetZone::Local,
                fallback_from: Some(identifier.to_string()),
            }
        }
    }
}

/// Map a local wall-clock time to an instant in `tz`
///
/// Ambiguous times (DST fold) resolve to the earlier instant. Times inside a
/// DST gap resolve to the first wall-clock time after the gap.
pub(crate) fn resolve_local<T: TimeZone>(tz: &T, naive: NaiveDateTime) -> DateTime<T> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt;
    }

    // Gaps are at most a few hours and aligned to quarter hours in every zone
    let mut candidate = naive;
    for _ in 0..(4 * 24) {
        candidate += Duration::minutes(15);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt;
        }
    }

    tz.from_utc_datetime(&naive)
}
