//! Creation-time windows
//!
//! Bounds are inclusive. A date-only start means the first second of that
//! day (`T00:00:00Z`); a date-only end means its last second (`T23:59:59Z`).

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use super::errors::{ReconcileError, ReconcileResult};

/// Inclusive `[start, end]` range of creation timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ReconcileResult<Self> {
        if start > end {
            return Err(ReconcileError::InvalidWindow(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Builds a window from optional operator-supplied bounds.
    ///
    /// Returns `None` when neither bound is given. A missing side is open.
    pub fn from_bounds(start: Option<&str>, end: Option<&str>) -> ReconcileResult<Option<Self>> {
        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        let start = match start {
            Some(text) => parse_bound(text, false)?,
            None => DateTime::<Utc>::MIN_UTC,
        };
        let end = match end {
            Some(text) => parse_bound(text, true)?,
            None => DateTime::<Utc>::MAX_UTC,
        };
        Self::new(start, end).map(Some)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

fn parse_bound(text: &str, is_end: bool) -> ReconcileResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
        ReconcileError::InvalidWindow(format!(
            "{:?} is neither YYYY-MM-DD nor an RFC 3339 timestamp",
            text
        ))
    })?;

    let time = if is_end {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| ReconcileError::InvalidWindow("invalid time of day".to_string()))?;

    Ok(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_only_bounds_expand_to_whole_days() {
        let window = TimeWindow::from_bounds(Some("2025-10-14"), Some("2025-10-31"))
            .unwrap()
            .unwrap();

        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 10, 14, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2025, 10, 31, 23, 59, 59).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 10, 31, 23, 59, 59).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2025, 10, 13, 23, 59, 59).unwrap()));
    }

    #[test]
    fn test_full_timestamps_accepted() {
        let window = TimeWindow::from_bounds(Some("2025-10-14T12:00:00Z"), Some("2025-10-14T13:00:00+01:00"))
            .unwrap()
            .unwrap();
        assert_eq!(window.start, window.end);
    }

    #[test]
    fn test_open_sides() {
        assert!(TimeWindow::from_bounds(None, None).unwrap().is_none());

        let window = TimeWindow::from_bounds(Some("2025-01-01"), None).unwrap().unwrap();
        assert!(window.contains(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(TimeWindow::from_bounds(Some("14/10/2025"), None).is_err());
        let err = TimeWindow::from_bounds(Some("2025-10-31"), Some("2025-10-01")).unwrap_err();
        assert_eq!(err.code(), "MEND_RECONCILE_INVALID_WINDOW");
    }
}
