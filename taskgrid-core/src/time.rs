//! Time utilities: minute arithmetic on a single UTC calendar.
//!
//! Every date/time pair in the engine is a UTC wall clock. Naive values
//! (`NaiveDate`, `NaiveTime`, `NaiveDateTime`) are always read as UTC;
//! conversion to a display timezone only happens at the CLI boundary via
//! [`parse_local_to_utc`] and [`format_in_zone`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid local datetime '{input}': {reason}")]
    InvalidDateTime { input: String, reason: String },

    #[error("ambiguous or invalid local time (DST?): {0}")]
    AmbiguousLocal(String),
}

pub fn to_minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * MINUTES_PER_HOUR + time.minute()
}

/// Add (or subtract, when negative) minutes to a UTC date/time pair.
pub fn add_minutes(date: NaiveDate, time: NaiveTime, minutes: i64) -> (NaiveDate, NaiveTime) {
    let shifted = date.and_time(time) + Duration::minutes(minutes);
    (shifted.date(), shifted.time())
}

/// Half-open interval test: `[a_start, a_end)` and `[b_start, b_end)` share a point.
///
/// Touching intervals (`a_end == b_start`) do not overlap.
pub fn intervals_overlap<T: Ord>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}

/// A duration broken into the day / hour / minute fields the editor shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationParts {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl DurationParts {
    pub fn from_minutes(total: u32) -> Self {
        Self {
            days: total / MINUTES_PER_DAY,
            hours: (total % MINUTES_PER_DAY) / MINUTES_PER_HOUR,
            minutes: total % MINUTES_PER_HOUR,
        }
    }

    /// Inverse of [`DurationParts::from_minutes`]. Unnormalized input
    /// (e.g. 90 minutes) is accepted and simply summed.
    pub fn to_minutes(self) -> u32 {
        self.days * MINUTES_PER_DAY + self.hours * MINUTES_PER_HOUR + self.minutes
    }
}

/// Midnight (00:00 UTC) at the start of `date`.
pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Drop seconds and sub-second precision; the engine works on whole minutes.
pub fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    let naive = dt.naive_utc();
    let trimmed = naive
        .date()
        .and_hms_opt(naive.hour(), naive.minute(), 0)
        .unwrap_or(naive);
    Utc.from_utc_datetime(&trimmed)
}

/// Most recent Monday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// The Monday..Sunday week containing `date`.
pub fn week_dates(date: NaiveDate) -> [NaiveDate; 7] {
    let monday = week_start(date);
    std::array::from_fn(|i| monday + Duration::days(i as i64))
}

/// Parse a wall clock like "2026-10-14 23:30" in an IANA tz like "Europe/Moscow",
/// returning UTC.
pub fn parse_local_to_utc(local: &str, tz: &str) -> Result<DateTime<Utc>, TimeError> {
    let tz: Tz = tz
        .parse()
        .map_err(|_| TimeError::InvalidTimezone(tz.to_string()))?;

    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M").map_err(|e| {
        TimeError::InvalidDateTime {
            input: local.to_string(),
            reason: e.to_string(),
        }
    })?;

    let local_dt = tz
        .from_local_datetime(&ndt)
        .single()
        .ok_or_else(|| TimeError::AmbiguousLocal(format!("{local} {tz}")))?;

    Ok(local_dt.with_timezone(&Utc))
}

/// Render a UTC instant as "YYYY-MM-DD HH:MM" in the given zone.
pub fn format_in_zone(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}
