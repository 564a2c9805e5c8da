// =============================================================================
// Granularity — candle width and absolute bucket boundary arithmetic
// =============================================================================
//
// A granularity is an integer count of a supported time unit (e.g. "5:MINUTE").
// Buckets are aligned to the start of the next-larger unit period, so two
// independently computed boundaries for the same instant always agree.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Supported candle time units, smallest first. Each unit aligns its buckets
/// against the start of the next-larger unit's period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Duration of one unit, in milliseconds.
    pub fn duration_millis(self) -> i64 {
        match self {
            Self::Second => 1_000,
            Self::Minute => 60_000,
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
        }
    }

    /// The unit immediately above this one in the ordered set.
    ///
    /// Fails for `Day`: there is no larger unit to align bucket boundaries
    /// against, so day-based granularities cannot be constructed at all.
    pub fn next_larger(self) -> Result<TimeUnit> {
        match self {
            Self::Second => Ok(Self::Minute),
            Self::Minute => Ok(Self::Hour),
            Self::Hour => Ok(Self::Day),
            Self::Day => bail!("unsupported time unit DAY: no larger unit to align against"),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Second => write!(f, "SECOND"),
            Self::Minute => write!(f, "MINUTE"),
            Self::Hour => write!(f, "HOUR"),
            Self::Day => write!(f, "DAY"),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "SECOND" | "SECONDS" => Ok(Self::Second),
            "MINUTE" | "MINUTES" => Ok(Self::Minute),
            "HOUR" | "HOURS" => Ok(Self::Hour),
            "DAY" | "DAYS" => Ok(Self::Day),
            other => bail!("unknown time unit '{other}'"),
        }
    }
}

/// A candle width: `size` multiples of `unit`. Used as a map key everywhere,
/// hence `Copy + Eq + Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Granularity {
    pub size: u32,
    pub unit: TimeUnit,
}

impl Granularity {
    /// Construct a validated granularity.
    ///
    /// The candle width must evenly divide the duration of the next-larger
    /// unit (e.g. 7:SECOND is rejected because 60s is not divisible by 7s).
    /// This guarantees that bucket boundary computation can never fail later.
    pub fn new(size: u32, unit: TimeUnit) -> Result<Self> {
        if size == 0 {
            bail!("tried to create inappropriate candle with unit {unit} and size 0");
        }
        let length = unit.duration_millis() * i64::from(size);
        let higher_unit_length = unit.next_larger()?.duration_millis();
        if higher_unit_length % length != 0 {
            bail!("tried to create inappropriate candle with unit {unit} and size {size}");
        }
        Ok(Self { size, unit })
    }

    /// Total candle width in milliseconds.
    pub fn duration_millis(&self) -> i64 {
        self.unit.duration_millis() * i64::from(self.size)
    }

    /// Start of the bucket that `t` falls into.
    ///
    /// Truncates `t` down to the start of the enclosing next-larger unit
    /// period, then steps forward by whole candle widths. Boundaries are
    /// absolute: they depend only on `t` and the granularity, never on
    /// arrival order or previous computations.
    pub fn bucket_start(&self, t: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let rough_start = truncate_millis(t, self.unit.next_larger()?.duration_millis());
        let minor_start = truncate_millis(t, self.unit.duration_millis());
        let delta = minor_start - rough_start;

        let interval_size = self.duration_millis();
        let intervals_elapsed = delta / interval_size;

        DateTime::from_timestamp_millis(rough_start + intervals_elapsed * interval_size)
            .context("bucket start out of representable range")
    }

    /// End of the bucket beginning at `start` (exclusive).
    pub fn bucket_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + Duration::milliseconds(self.duration_millis())
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.size, self.unit)
    }
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    /// Parse the config/API form `"<size>:<UNIT>"`, e.g. `"5:MINUTE"`.
    fn from_str(s: &str) -> Result<Self> {
        let (size, unit) = s
            .split_once(':')
            .with_context(|| format!("invalid granularity '{s}': expected '<size>:<UNIT>'"))?;
        let size: u32 = size
            .trim()
            .parse()
            .with_context(|| format!("invalid granularity size in '{s}'"))?;
        Granularity::new(size, unit.trim().parse()?)
    }
}

/// Truncate `t` down to a whole multiple of `unit_millis` since the epoch.
/// `div_euclid` keeps pre-epoch instants rounding toward earlier time.
fn truncate_millis(t: DateTime<Utc>, unit_millis: i64) -> i64 {
    t.timestamp_millis().div_euclid(unit_millis) * unit_millis
}

// =============================================================================
// Tests
// =============================================================================
