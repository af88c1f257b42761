//! IST calendar-day arithmetic
//!
//! Every "day" on the desk is a calendar day at a fixed UTC+05:30 offset,
//! whatever the host timezone is.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Mutex;

pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is within a day")
}

/// Calendar date of `instant` in IST
pub fn ist_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&ist_offset()).date_naive()
}

/// Half-open UTC interval `[start, end)` covering one IST calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(date: NaiveDate) -> Self {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = Utc.from_utc_datetime(
            &(local_midnight - Duration::seconds(i64::from(IST_OFFSET_SECS))),
        );
        Self {
            date,
            start,
            end: start + Duration::days(1),
        }
    }

    /// Window of the IST day containing `now`
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self::for_date(ist_date(now))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Source of "now" for windowed queries
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_window_bounds_are_ist_midnights() {
        let window = DayWindow::for_date(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(window.start, utc("2026-10-17T18:30:00Z"));
        assert_eq!(window.end, utc("2026-10-18T18:30:00Z"));
    }

    #[test]
    fn test_window_membership() {
        let window = DayWindow::for_date(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert!(window.contains(utc("2026-10-17T18:30:00Z")));
        assert!(window.contains(utc("2026-10-18T18:29:59.999Z")));
        assert!(!window.contains(utc("2026-10-18T18:30:00Z")));
        assert!(!window.contains(utc("2026-10-17T18:29:59.999Z")));
    }

    #[test]
    fn test_late_utc_evening_is_next_ist_day() {
        // 20:00 UTC on the 17th is 01:30 IST on the 18th
        let now = utc("2026-10-17T20:00:00Z");
        assert_eq!(ist_date(now), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert_eq!(DayWindow::containing(now).date, NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(utc("2026-10-18T04:00:00Z"));
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), utc("2026-10-18T06:00:00Z"));
    }
}
