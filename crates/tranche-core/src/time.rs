//! Venue time-of-day utilities.
//!
//! Orders are scheduled by time of day in the trading venue's timezone.
//! Used for:
//! - Computing the dispatcher's `now` at second resolution
//! - Normalizing scheduled times to the pending index resolution

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Granularity of the pending index time buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeResolution {
    /// Buckets per second. Matches the dispatcher tick.
    #[default]
    Second,
    /// Buckets per minute. An order fires at the start of its minute.
    Minute,
}

impl TimeResolution {
    /// Truncate a time of day to this resolution.
    #[must_use]
    pub fn normalize(&self, time: NaiveTime) -> NaiveTime {
        let (h, m, s) = (time.hour(), time.minute(), time.second());
        let normalized = match self {
            Self::Second => NaiveTime::from_hms_opt(h, m, s),
            Self::Minute => NaiveTime::from_hms_opt(h, m, 0),
        };
        // h/m/s come from a valid NaiveTime; leap seconds (s == 60) are not
        // produced by `second()`.
        normalized.unwrap_or(time)
    }
}

impl fmt::Display for TimeResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Second => write!(f, "second"),
            Self::Minute => write!(f, "minute"),
        }
    }
}

/// Clock that reports time of day in the venue's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueClock {
    offset: FixedOffset,
}

impl VenueClock {
    /// Moscow Exchange offset (UTC+3).
    pub const DEFAULT_OFFSET_SECS: i32 = 3 * 3600;

    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Parse an offset such as `+03:00` or `-05:30`.
    pub fn from_offset_str(s: &str) -> Result<Self> {
        FixedOffset::from_str(s)
            .map(Self::new)
            .map_err(|e| CoreError::InvalidOffset(format!("{s}: {e}")))
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Current venue time of day at second resolution.
    #[must_use]
    pub fn now(&self) -> NaiveTime {
        self.time_at(Utc::now())
    }

    /// Venue time of day for a UTC instant, at second resolution.
    #[must_use]
    pub fn time_at(&self, instant: DateTime<Utc>) -> NaiveTime {
        let local = instant.with_timezone(&self.offset).time();
        TimeResolution::Second.normalize(local)
    }
}

impl Default for VenueClock {
    fn default() -> Self {
        let offset = FixedOffset::east_opt(Self::DEFAULT_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}
