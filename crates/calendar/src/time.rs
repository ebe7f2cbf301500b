//! Instant resolution and interval arithmetic.

use {
    chrono::{
        DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
        Utc,
    },
    chrono_tz::Tz,
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result, error::ValidationError};

/// Compact UTC form used in instance identifiers and `UNTIL=` clauses.
const COMPACT_UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Civil (offset-less) date-time layouts accepted from callers.
const CIVIL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A half-open absolute interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    #[must_use]
    pub fn overlap(&self, other: &TimeWindow) -> Duration {
        overlap(self.start, self.end, other.start, other.end)
    }

    #[must_use]
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.overlap(other) > Duration::zero()
    }

    /// Whether `other` lies entirely inside this window.
    #[must_use]
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::unknown_timezone(name))
}

/// Whether `value` carries its own UTC marker or numeric offset.
#[must_use]
pub fn has_offset(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value.trim()).is_ok()
}

/// Whether `value` is a bare civil date (`YYYY-MM-DD`).
#[must_use]
pub fn is_date_only(value: &str) -> bool {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).is_ok()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidTimestamp {
            value: value.to_string(),
        }
        .into()
    })
}

#[must_use]
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

/// Resolve `value` to an absolute instant.
///
/// Values with an offset are returned as-is. Civil date-times and dates are
/// read as wall-clock time in `fallback_tz`.
pub fn to_instant(value: &str, fallback_tz: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let naive = parse_civil(value).ok_or_else(|| ValidationError::InvalidTimestamp {
        value: value.to_string(),
    })?;
    let zone = parse_timezone(fallback_tz)?;
    Ok(localize(&zone, naive).with_timezone(&Utc))
}

fn parse_civil(value: &str) -> Option<NaiveDateTime> {
    CIVIL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(start_of_day)
        })
}

/// Attach `zone` to a wall-clock time, resolving DST transitions:
/// - ambiguous times (fall back) take the earlier instant;
/// - skipped times (spring forward) keep the offset in force before the gap,
///   which lands them just past it (02:30 in a 02:00→03:00 gap becomes 03:30).
pub fn localize<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> DateTime<Z> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(a, b) => {
            if a <= b {
                a
            } else {
                b
            }
        },
        LocalResult::None => {
            let offset_before = zone
                .offset_from_local_datetime(&(naive - Duration::days(1)))
                .earliest()
                .map(|o| o.fix().local_minus_utc())
                .unwrap_or(0);
            zone.from_utc_datetime(&(naive - Duration::seconds(i64::from(offset_before))))
        },
    }
}

/// Overlap between `[a_start, a_end)` and `[b_start, b_end)`, never negative.
/// Back-to-back intervals overlap by zero.
#[must_use]
pub fn overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> Duration {
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);
    if end > start {
        end - start
    } else {
        Duration::zero()
    }
}

/// `YYYYMMDDTHHMMSSZ` in UTC, whatever the input's offset.
#[must_use]
pub fn compact_utc_timestamp<Z: TimeZone>(instant: &DateTime<Z>) -> String {
    instant
        .with_timezone(&Utc)
        .format(COMPACT_UTC_FORMAT)
        .to_string()
}

/// Inverse of [`compact_utc_timestamp`].
#[must_use]
pub fn parse_compact_utc_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, COMPACT_UTC_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
