//! Canonical timestamps and the strategies deriving them.
//!
//! Every record family derives time in one of three ways: from a hardware
//! counter ([`CounterClock`]), by interpolating across an envelope's declared
//! window ([`Interpolation`]), or from an embedded text field
//! ([`parse_logger_time`]). All produce a [`Timestamp`].

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime, macros::format_description};

use crate::codec::DecodeError;

/// Seconds since the Unix epoch (UTC), with sub-second precision.
///
/// Comparisons tolerate differences up to [`Timestamp::TOLERANCE`], so that
/// floating-point accumulation in derived times does not break equality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Largest difference, in seconds, at which two timestamps are equal.
    pub const TOLERANCE: f64 = 1e-5;

    /// Seconds from the NTP epoch (1900-01-01) to the Unix epoch.
    pub const NTP_OFFSET: f64 = 2_208_988_800.0;

    pub const fn from_unix_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    pub const fn unix_seconds(self) -> f64 {
        self.0
    }

    /// Seconds since the NTP epoch.
    pub fn ntp_seconds(self) -> f64 {
        self.0 + Self::NTP_OFFSET
    }

    pub fn from_datetime(datetime: OffsetDateTime) -> Self {
        Self(datetime.unix_timestamp_nanos() as f64 / 1e9)
    }

    /// Convert to a calendar date and time, if representable.
    pub fn to_datetime(self) -> Option<OffsetDateTime> {
        if !self.0.is_finite() {
            return None;
        }

        let nanos = (self.0 * 1e9).round() as i128;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }

    /// The timestamp `seconds` later.
    pub fn offset(self, seconds: f64) -> Self {
        Self(self.0 + seconds)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        (self.0 - other.0).abs() <= Self::TOLERANCE
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else {
            self.0.partial_cmp(&other.0)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(datetime) => write!(f, "{datetime}"),
            None => write!(f, "{}s", self.0),
        }
    }
}

/// A free-running hardware counter anchored to a session origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterClock {
    pub origin: Timestamp,
    /// Counter ticks per second.
    pub tick_rate: f64,
}

impl CounterClock {
    /// The time at which the counter read `ticks`, given that it read
    /// `anchor` at the origin. The counter may wrap once between the two.
    pub fn at(&self, anchor: u32, ticks: u32) -> Timestamp {
        let elapsed = ticks.wrapping_sub(anchor);
        self.origin.offset(f64::from(elapsed) / self.tick_rate)
    }
}

/// Evenly spaced sample times across a declared window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub start: Timestamp,
    pub end: Timestamp,
    pub count: u32,
}

impl Interpolation {
    /// The time of the sample at `index`.
    pub fn at(&self, index: u32) -> Timestamp {
        if self.count == 0 {
            return self.start;
        }

        let span = self.end.unix_seconds() - self.start.unix_seconds();
        self.start.offset(f64::from(index) * span / f64::from(self.count))
    }
}

/// Parse a logger's `YYYY/MM/DD HH:MM:SS.mmm` text timestamp (UTC).
pub fn parse_logger_time(text: &str) -> Result<Timestamp, DecodeError> {
    let format =
        format_description!("[year]/[month]/[day] [hour]:[minute]:[second].[subsecond digits:3]");

    PrimitiveDateTime::parse(text, format)
        .map(|datetime| Timestamp::from_datetime(datetime.assume_utc()))
        .map_err(|err| DecodeError::Timestamp(format!("{text:?}: {err}")))
}

/// Find a session origin in a source name: the first `YYYYMMDD_HHMMSS`
/// group forming a valid UTC date and time.
pub fn origin_from_source_name(name: &str) -> Option<Timestamp> {
    const LEN: usize = 15;

    let format = format_description!("[year][month][day]_[hour][minute][second]");

    let bytes = name.as_bytes();
    (0..bytes.len().saturating_sub(LEN - 1)).find_map(|i| {
        let window = &bytes[i..i + LEN];
        let shaped = window.iter().enumerate().all(|(j, b)| match j {
            8 => *b == b'_',
            _ => b.is_ascii_digit(),
        });

        if !shaped {
            return None;
        }

        let text = std::str::from_utf8(window).ok()?;
        PrimitiveDateTime::parse(text, format)
            .ok()
            .map(|datetime| Timestamp::from_datetime(datetime.assume_utc()))
    })
}
