//! Date and time helpers on top of `chrono`.
//!
//! Calendar operations (`start_of_day`, `is_weekend`, ...) work in the time
//! zone of the value passed in.

use std::{fmt, time::Duration as StdDuration};

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};

/// `2006-01-02T15:04:05Z`
pub const ISO8601_UTC: &str = "%Y-%m-%dT%H:%M:%SZ";
/// `2006-01-02T15:04:05-07:00`
pub const ISO8601: &str = "%Y-%m-%dT%H:%M:%S%:z";
/// `2006-01-02`
pub const DATE_ONLY: &str = "%Y-%m-%d";
/// `15:04:05`
pub const TIME_ONLY: &str = "%H:%M:%S";
/// `2006-01-02 15:04:05`
pub const DATE_TIME: &str = "%Y-%m-%d %H:%M:%S";
/// `January 2, 2006`
pub const HUMAN_READABLE_DATE: &str = "%B %-d, %Y";
/// `January 2, 2006 3:04 PM`
pub const HUMAN_READABLE_DATE_TIME: &str = "%B %-d, %Y %-I:%M %p";

const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// Formats that carry an explicit offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S %z",
    "%a %b %e %H:%M:%S %z %Y",
    "%d %b %y %H:%M %z",
];

/// Date-time formats without an offset; parsed as UTC.
const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%a %b %e %H:%M:%S %Y",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S UTC",
];

/// Date-only formats; parsed as midnight UTC. Month-first wins over
/// day-first when both would match.
const NAIVE_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
];

/// Returned when no known format matches.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unable to parse time string: {0}")]
pub struct ParseTimeError(pub String);

/// Parses `value` with the first matching common format.
pub fn parse_any(value: &str) -> Result<DateTime<FixedOffset>, ParseTimeError> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Ok(parsed);
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Ok(parsed);
        }
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc().fixed_offset());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return Ok(parsed.and_time(NaiveTime::MIN).and_utc().fixed_offset());
        }
    }

    Err(ParseTimeError(value.to_owned()))
}

/// `2024-03-01T12:00:00Z`, always in UTC.
pub fn format_iso8601<Tz: TimeZone>(value: &DateTime<Tz>) -> String {
    value.with_timezone(&Utc).format(ISO8601_UTC).to_string()
}

/// `2024-03-01T14:00:00+02:00`, in the value's own offset.
pub fn format_iso8601_with_tz<Tz>(value: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    value.format(ISO8601).to_string()
}

pub fn format_date<Tz>(value: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    value.format(DATE_ONLY).to_string()
}

/// Current time in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn start_of_day<Tz: TimeZone>(value: &DateTime<Tz>) -> DateTime<Tz> {
    at_local(&value.timezone(), value.date_naive().and_time(NaiveTime::MIN))
}

/// Last nanosecond of the value's day.
pub fn end_of_day<Tz: TimeZone>(value: &DateTime<Tz>) -> DateTime<Tz> {
    let midnight = value.date_naive().and_time(NaiveTime::MIN);
    at_local(
        &value.timezone(),
        midnight + Duration::nanoseconds(NANOS_PER_DAY - 1),
    )
}

pub fn start_of_month<Tz: TimeZone>(value: &DateTime<Tz>) -> DateTime<Tz> {
    let date = value.date_naive();
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
    at_local(&value.timezone(), first.and_time(NaiveTime::MIN))
}

/// Last nanosecond of the value's month.
pub fn end_of_month<Tz: TimeZone>(value: &DateTime<Tz>) -> DateTime<Tz> {
    let date = value.date_naive();
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let next_month = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date);
    at_local(
        &value.timezone(),
        next_month.and_time(NaiveTime::MIN) - Duration::nanoseconds(1),
    )
}

/// Human-readable duration: `"2 days, 5 hours and 15 minutes"`.
///
/// Zero components are skipped; a duration under one second reads `"0 seconds"`.
pub fn format_duration(duration: StdDuration) -> String {
    let total = duration.as_secs();
    let units = [
        (total / 86_400, "day"),
        ((total / 3_600) % 24, "hour"),
        ((total / 60) % 60, "minute"),
        (total % 60, "second"),
    ];

    let mut parts: Vec<String> = units
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, unit)| plural(*count, unit))
        .collect();
    if parts.is_empty() {
        parts.push(plural(0, "second"));
    }

    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
        _ => parts.concat(),
    }
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

pub fn is_weekend<Tz: TimeZone>(value: &DateTime<Tz>) -> bool {
    matches!(value.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Adds `days` weekdays, skipping Saturdays and Sundays (holidays are not
/// considered).
pub fn add_business_days<Tz: TimeZone>(value: &DateTime<Tz>, days: u32) -> DateTime<Tz> {
    let mut result = value.clone();
    let mut remaining = days;
    while remaining > 0 {
        result = result + Duration::days(1);
        if !is_weekend(&result) {
            remaining -= 1;
        }
    }
    result
}

/// Compares calendar dates, each in its own time zone.
pub fn is_same_day<A: TimeZone, B: TimeZone>(a: &DateTime<A>, b: &DateTime<B>) -> bool {
    a.date_naive() == b.date_naive()
}

/// Resolves a wall-clock time in `tz`, preferring the earlier instant on
/// DST overlaps and reading the time as UTC inside a DST gap.
fn at_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&local))
}
