//! Event lifecycle derivation
//!
//! An event's status is never stored. It is computed from its scheduled
//! start, its duration and an explicit evaluation instant:
//!
//! * `now < start`          → [`EventStatus::Upcoming`]
//! * `start <= now <= end`  → [`EventStatus::Active`]
//! * `now > end`            → [`EventStatus::Completed`]
//!
//! The active window is closed on both ends: an event is still active at
//! the exact instant it starts and at the exact instant it ends.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Malformed schedule data (caller error)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidSchedule {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    Date(String),

    #[error("invalid start time {0:?}, expected HH:MM")]
    Time(String),

    #[error("invalid duration {0} hours, expected a positive number of at most one year")]
    Duration(f64),
}

/// Derived lifecycle status of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Active,
    Completed,
}

impl EventStatus {
    /// Registrations are accepted until the event is over
    pub fn accepts_registrations(&self) -> bool {
        is_publicly_listed(*self)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Active => "active",
            EventStatus::Completed => "completed",
        };
        write!(f, "{}", label)
    }
}

/// Whether an event in this state appears in the public listing
pub fn is_publicly_listed(status: EventStatus) -> bool {
    matches!(status, EventStatus::Upcoming | EventStatus::Active)
}

/// Longest accepted event, in hours (a year-long exhibition)
pub const MAX_DURATION_HOURS: f64 = 24.0 * 366.0;

/// A validated start instant plus duration, in the center's local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Schedule {
    pub fn new(date: NaiveDate, time: NaiveTime, duration_hours: f64) -> Result<Self, InvalidSchedule> {
        if !duration_hours.is_finite() || duration_hours <= 0.0 || duration_hours > MAX_DURATION_HOURS {
            return Err(InvalidSchedule::Duration(duration_hours));
        }
        let millis = (duration_hours * 3_600_000.0).round() as i64;
        let start = date.and_time(time);
        let end = Duration::try_milliseconds(millis)
            .and_then(|duration| start.checked_add_signed(duration))
            .ok_or(InvalidSchedule::Duration(duration_hours))?;
        Ok(Self { start, end })
    }

    /// Build a schedule from `YYYY-MM-DD` and `HH:MM` (or `HH:MM:SS`) strings
    pub fn parse(date: &str, time: &str, duration_hours: f64) -> Result<Self, InvalidSchedule> {
        Self::new(parse_date(date)?, parse_time(time)?, duration_hours)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn classify(&self, now: NaiveDateTime) -> EventStatus {
        if now < self.start {
            EventStatus::Upcoming
        } else if now > self.end {
            EventStatus::Completed
        } else {
            EventStatus::Active
        }
    }
}

/// Classify an event from its raw schedule fields
pub fn classify(
    date: NaiveDate,
    time: NaiveTime,
    duration_hours: f64,
    now: NaiveDateTime,
) -> Result<EventStatus, InvalidSchedule> {
    Ok(Schedule::new(date, time, duration_hours)?.classify(now))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, InvalidSchedule> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| InvalidSchedule::Date(value.to_string()))
}

pub fn parse_time(value: &str) -> Result<NaiveTime, InvalidSchedule> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| InvalidSchedule::Time(value.to_string()))
}

/// Time zone of the center
#[derive(Debug, Clone, Copy, PartialEq)]
enum Zone {
    Fixed(FixedOffset),
    /// IANA zone, daylight saving time included
    Named(Tz),
}

/// Converts evaluation instants into the center's wall-clock time
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    zone: Zone,
}

impl Calendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { zone: Zone::Fixed(offset) }
    }

    pub fn named(zone: Tz) -> Self {
        Self { zone: Zone::Named(zone) }
    }

    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self.zone {
            Zone::Fixed(offset) => instant.with_timezone(&offset).naive_local(),
            Zone::Named(zone) => instant.with_timezone(&zone).naive_local(),
        }
    }

    pub fn status_at(&self, schedule: &Schedule, instant: DateTime<Utc>) -> EventStatus {
        schedule.classify(self.local(instant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn concert() -> Schedule {
        Schedule::parse("2025-06-15", "20:00", 3.0).unwrap()
    }

    #[test]
    fn test_before_start_is_upcoming() {
        let schedule = concert();
        for now in ["2025-06-14 20:00", "2025-06-15 19:59", "2024-01-01 00:00"] {
            assert_eq!(schedule.classify(at(now)), EventStatus::Upcoming, "{}", now);
        }
    }

    #[test]
    fn test_inside_window_is_active() {
        let schedule = concert();
        assert_eq!(schedule.classify(at("2025-06-15 21:00")), EventStatus::Active);
        assert_eq!(schedule.classify(at("2025-06-15 22:59")), EventStatus::Active);
        assert!(is_publicly_listed(schedule.classify(at("2025-06-15 21:00"))));
    }

    #[test]
    fn test_after_end_is_completed() {
        let schedule = concert();
        let status = schedule.classify(at("2025-06-16 00:01"));
        assert_eq!(status, EventStatus::Completed);
        assert!(!is_publicly_listed(status));
    }

    #[test]
    fn test_boundaries_are_active() {
        let schedule = concert();
        assert_eq!(schedule.classify(at("2025-06-15 20:00")), EventStatus::Active);
        assert_eq!(schedule.classify(at("2025-06-15 23:00")), EventStatus::Active);
        assert_eq!(
            schedule.classify(at("2025-06-15 23:00") + Duration::seconds(1)),
            EventStatus::Completed
        );
    }

    #[test]
    fn test_fractional_duration_crosses_midnight() {
        let schedule = Schedule::parse("2025-12-31", "22:30", 2.25).unwrap();
        assert_eq!(schedule.end(), at("2026-01-01 00:45"));
        assert_eq!(schedule.classify(at("2026-01-01 00:30")), EventStatus::Active);
        assert_eq!(schedule.classify(at("2026-01-01 00:46")), EventStatus::Completed);
    }

    #[test]
    fn test_listing_predicate() {
        assert!(is_publicly_listed(EventStatus::Upcoming));
        assert!(is_publicly_listed(EventStatus::Active));
        assert!(!is_publicly_listed(EventStatus::Completed));
        assert!(EventStatus::Active.accepts_registrations());
        assert!(!EventStatus::Completed.accepts_registrations());
    }

    #[test]
    fn test_invalid_schedule() {
        assert_eq!(
            Schedule::parse("15/06/2025", "20:00", 1.0),
            Err(InvalidSchedule::Date("15/06/2025".to_string()))
        );
        assert_eq!(
            Schedule::parse("2025-06-15", "8pm", 1.0),
            Err(InvalidSchedule::Time("8pm".to_string()))
        );
        assert!(matches!(
            Schedule::parse("2025-06-15", "20:00", 0.0),
            Err(InvalidSchedule::Duration(_))
        ));
        assert!(Schedule::parse("2025-06-15", "20:00", f64::NAN).is_err());
        assert!(Schedule::parse("2025-06-15", "20:00:30", 1.5).is_ok());
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        assert_eq!(
            Schedule::parse("2025-06-15", "20:00", 1e10),
            Err(InvalidSchedule::Duration(1e10))
        );
        assert!(Schedule::parse("2025-06-15", "20:00", MAX_DURATION_HOURS).is_ok());
        assert!(Schedule::parse("2025-06-15", "20:00", MAX_DURATION_HOURS + 1.0).is_err());
        // End past the last representable instant
        let last_day = Schedule::new(NaiveDate::MAX, NaiveTime::from_hms_opt(23, 0, 0).unwrap(), 2.0);
        assert!(matches!(last_day, Err(InvalidSchedule::Duration(_))));
    }

    #[test]
    fn test_calendar_applies_offset() {
        let calendar = Calendar::new(FixedOffset::east_opt(2 * 3600).unwrap());
        let schedule = concert();
        // 19:30 UTC is 21:30 in the center
        let instant = Utc.with_ymd_and_hms(2025, 6, 15, 19, 30, 0).unwrap();
        assert_eq!(calendar.local(instant), at("2025-06-15 21:30"));
        assert_eq!(calendar.status_at(&schedule, instant), EventStatus::Active);
        let before = Utc.with_ymd_and_hms(2025, 6, 15, 17, 30, 0).unwrap();
        assert_eq!(calendar.status_at(&schedule, before), EventStatus::Upcoming);
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() {
        let calendar = Calendar::named(chrono_tz::Europe::Paris);
        let schedule = concert();
        // Summer: UTC+2
        let summer = Utc.with_ymd_and_hms(2025, 6, 15, 18, 30, 0).unwrap();
        assert_eq!(calendar.local(summer), at("2025-06-15 20:30"));
        assert_eq!(calendar.status_at(&schedule, summer), EventStatus::Active);
        // Winter: UTC+1
        let winter = Utc.with_ymd_and_hms(2025, 1, 15, 18, 30, 0).unwrap();
        assert_eq!(calendar.local(winter), at("2025-01-15 19:30"));
    }
}
