use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::error::{Error, Result};

static RE_WEEKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2})[wW]$").unwrap());

/// A relative reporting window, expressed in weeks back from "now".
///
/// The dashboard exposes `1w`, `2w`, `4w`, `8w` and `12w`; the parser accepts
/// any `<n>w` within that span so new presets don't need a code change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportRange {
    weeks: u32,
}

impl ReportRange {
    pub const MIN_WEEKS: u32 = 1;
    pub const MAX_WEEKS: u32 = 12;

    pub fn new(weeks: u32) -> Result<Self> {
        if (Self::MIN_WEEKS..=Self::MAX_WEEKS).contains(&weeks) {
            Ok(Self { weeks })
        } else {
            Err(Error::RangeParse(format!("{weeks}w is out of range")))
        }
    }

    /// Parse a range token: `1w`, `2w`, `4w`, `8w`, `12w`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(caps) = RE_WEEKS.captures(s) {
            let weeks: u32 = caps[1]
                .parse()
                .map_err(|_| Error::RangeParse(format!("unrecognized range: {s}")))?;
            return Self::new(weeks);
        }
        Err(Error::RangeParse(format!("unrecognized range: {s}")))
    }

    pub fn weeks(&self) -> u32 {
        self.weeks
    }

    /// Canonical key string for cache keys and export filenames.
    pub fn to_key(&self) -> String {
        format!("{}w", self.weeks)
    }

    /// Inclusive start / exclusive end of the window ending at `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - Duration::weeks(self.weeks as i64), now)
    }

    /// The immediately preceding window of equal length. Trend deltas compare
    /// the current window against this one.
    pub fn previous_bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let (start, _) = self.bounds(now);
        (start - Duration::weeks(self.weeks as i64), start)
    }
}

impl Default for ReportRange {
    fn default() -> Self {
        Self { weeks: 4 }
    }
}

impl std::fmt::Display for ReportRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_presets() {
        for token in ["1w", "2w", "4w", "8w", "12w"] {
            let r = ReportRange::parse(token).unwrap();
            assert_eq!(r.to_key(), token);
        }
    }

    #[test]
    fn test_parse_uppercase() {
        assert_eq!(ReportRange::parse("4W").unwrap().weeks(), 4);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ReportRange::parse("garbage").is_err());
        assert!(ReportRange::parse("0w").is_err());
        assert!(ReportRange::parse("13w").is_err());
        assert!(ReportRange::parse("4d").is_err());
        assert!(ReportRange::parse("").is_err());
    }

    #[test]
    fn test_default_is_four_weeks() {
        assert_eq!(ReportRange::default().to_key(), "4w");
    }

    #[test]
    fn test_bounds() {
        let now = Utc.with_ymd_and_hms(2025, 6, 29, 12, 0, 0).unwrap();
        let (start, end) = ReportRange::parse("4w").unwrap().bounds(now);
        assert_eq!(end, now);
        assert_eq!((end - start).num_days(), 28);
    }

    #[test]
    fn test_previous_bounds_abut_current() {
        let now = Utc.with_ymd_and_hms(2025, 6, 29, 12, 0, 0).unwrap();
        let range = ReportRange::parse("2w").unwrap();
        let (cur_start, _) = range.bounds(now);
        let (prev_start, prev_end) = range.previous_bounds(now);
        assert_eq!(prev_end, cur_start);
        assert_eq!((prev_end - prev_start).num_days(), 14);
    }
}
