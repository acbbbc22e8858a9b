//! Clock abstraction and day/week boundary policy
//!
//! Day-sensitive logic (streaks, daily counters, daily grant caps) must all
//! agree on what "today" means. `TimePolicy` pins a single reference UTC
//! offset and week-start weekday for the whole engine; components never call
//! `Utc::now()` directly for business decisions — they go through a `Clock`
//! so tests can pin time.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable clock for tests. Starts at the given instant and only
/// moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().expect("clock lock poisoned") = now;
    }

    pub fn advance(&self, delta: Duration) {
        let mut guard = self.now.write().expect("clock lock poisoned");
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}

// ── Time Policy ──────────────────────────────────────────────────────

/// Fixed reference timezone (as a UTC offset) and week-start anchor.
///
/// Applied uniformly: every calendar-day and calendar-week decision in the
/// engine converts timestamps through the same policy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TimePolicy {
    /// Reference offset from UTC, in seconds (e.g. 3600 for UTC+1).
    pub utc_offset_secs: i32,
    /// First day of the week for weekly mission counters.
    pub week_start: Weekday,
}

impl Default for TimePolicy {
    fn default() -> Self {
        Self {
            utc_offset_secs: 0,
            week_start: Weekday::Mon,
        }
    }
}

impl TimePolicy {
    pub fn new(utc_offset_secs: i32, week_start: Weekday) -> Self {
        Self {
            utc_offset_secs,
            week_start,
        }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }

    /// Calendar date of an instant in the reference timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset()).date_naive()
    }

    /// The week-start date (anchor) containing the given instant.
    pub fn week_anchor(&self, instant: DateTime<Utc>) -> NaiveDate {
        let date = self.local_date(instant);
        let days_back = (7 + date.weekday().num_days_from_monday() as i64
            - self.week_start.num_days_from_monday() as i64)
            % 7;
        date - Duration::days(days_back)
    }

    /// UTC bounds [start, end) of the reference-timezone calendar day
    /// containing the given instant. Used for daily grant caps.
    pub fn day_bounds(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = self.local_date(instant);
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        let start = midnight
            .and_local_timezone(self.offset())
            .single()
            .expect("fixed offsets have no DST gaps")
            .with_timezone(&Utc);
        (start, start + Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid timestamp")
    }

    #[test]
    fn test_local_date_respects_offset() {
        // 23:30 UTC is already the next day at UTC+1
        let policy = TimePolicy::new(3600, Weekday::Mon);
        let instant = ts("2026-03-01T23:30:00Z");
        assert_eq!(
            policy.local_date(instant),
            NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid")
        );
    }

    #[test]
    fn test_week_anchor_monday_start() {
        let policy = TimePolicy::default();
        // 2026-03-04 is a Wednesday; the week anchors on Monday 03-02
        let anchor = policy.week_anchor(ts("2026-03-04T12:00:00Z"));
        assert_eq!(anchor, NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid"));
        // A Monday anchors on itself
        let anchor = policy.week_anchor(ts("2026-03-02T00:00:00Z"));
        assert_eq!(anchor, NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid"));
    }

    #[test]
    fn test_week_anchor_sunday_start() {
        let policy = TimePolicy::new(0, Weekday::Sun);
        let anchor = policy.week_anchor(ts("2026-03-04T12:00:00Z"));
        assert_eq!(anchor, NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid"));
    }

    #[test]
    fn test_day_bounds_cover_exactly_one_day() {
        let policy = TimePolicy::new(-5 * 3600, Weekday::Mon);
        let instant = ts("2026-03-01T03:00:00Z"); // still Feb 28 at UTC-5
        let (start, end) = policy.day_bounds(instant);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 28, 5, 0, 0).unwrap());
        assert_eq!(end - start, Duration::days(1));
        assert!(start <= instant && instant < end);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::at(ts("2026-01-01T00:00:00Z"));
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), ts("2026-01-01T02:00:00Z"));
    }
}
