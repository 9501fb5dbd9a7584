use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A timestamp as it arrives from the document store. Upstream writers have
/// produced three shapes over time: an ISO-8601 string, a raw epoch value in
/// milliseconds, and a `{seconds, nanoseconds}` wrapper object.
///
/// Nothing in the engine compares these raw values directly; everything goes
/// through [`to_utc`] first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInstant {
    Millis(i64),
    Iso(String),
    Wrapped {
        seconds: i64,
        #[serde(default)]
        nanoseconds: u32,
    },
}

/// Normalize a raw timestamp into a canonical instant.
///
/// Returns `None` when the value cannot be interpreted; callers exclude such
/// records from date-bounded calculations rather than failing the report.
pub fn to_utc(raw: &RawInstant) -> Option<DateTime<Utc>> {
    match raw {
        RawInstant::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
        RawInstant::Wrapped {
            seconds,
            nanoseconds,
        } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
        RawInstant::Iso(s) => parse_iso(s),
    }
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Date-only values are common for due dates
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|ndt| Utc.from_utc_datetime(&ndt));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    None
}

/// Normalize an optional raw timestamp; `None` stays `None`.
pub fn to_utc_opt(raw: Option<&RawInstant>) -> Option<DateTime<Utc>> {
    raw.and_then(to_utc)
}

/// Canonical day key (`YYYY-MM-DD`) used for calendar and daily chart buckets.
pub fn day_key(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Number of days in a given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(f), Some(n)) => (n - f).num_days() as u32,
        _ => 30,
    }
}

/// Slice `[start, end)` into consecutive 7-day windows. The final window is
/// clamped to `end`, so short tails still get a bucket.
pub fn week_windows(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + Duration::days(7)).min(end);
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

/// First instant of the month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0));
    match first {
        Some(ndt) => Utc.from_utc_datetime(&ndt),
        None => now,
    }
}
