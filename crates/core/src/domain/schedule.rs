// Fixed-slot schedule calculator
//
// Every schedule is a closed set of wall-clock slots, and the next run is
// always the next calendar boundary. Anchoring to slots instead of
// "now + interval" means repeated runs cannot accumulate drift.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Minimum delay handed to the job queue, in seconds
pub const MIN_DELAY_SECS: i64 = 60;

/// Named fixed schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    #[serde(rename = "disabled")]
    Disabled,
    #[serde(rename = "every6hours")]
    Every6Hours,
    #[serde(rename = "every12hours")]
    Every12Hours,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "daily2am")]
    Daily2am,
    #[serde(rename = "weekly")]
    Weekly,
}

impl Schedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schedule::Disabled => "disabled",
            Schedule::Every6Hours => "every6hours",
            Schedule::Every12Hours => "every12hours",
            Schedule::Daily => "daily",
            Schedule::Daily2am => "daily2am",
            Schedule::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "disabled" => Ok(Schedule::Disabled),
            "every6hours" => Ok(Schedule::Every6Hours),
            "every12hours" => Ok(Schedule::Every12Hours),
            "daily" => Ok(Schedule::Daily),
            "daily2am" => Ok(Schedule::Daily2am),
            "weekly" => Ok(Schedule::Weekly),
            other => Err(DomainError::UnknownSchedule(other.to_string())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Schedule::Disabled)
    }

    /// Hour-of-day slots for the daily schedules; empty for the others
    fn hour_slots(&self) -> &'static [u32] {
        match self {
            Schedule::Every6Hours => &[0, 6, 12, 18],
            Schedule::Every12Hours => &[0, 12],
            Schedule::Daily => &[0],
            Schedule::Daily2am => &[2],
            Schedule::Disabled | Schedule::Weekly => &[],
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Next slot instant strictly after `now_millis`, or None for `disabled`.
///
/// A run landing exactly on a slot instant counts that slot as consumed
/// and advances to the next occurrence.
pub fn next_run_millis(schedule: Schedule, now_millis: i64) -> Option<i64> {
    let now = DateTime::from_timestamp_millis(now_millis)?;
    match schedule {
        Schedule::Disabled => None,
        Schedule::Weekly => Some(next_weekday_slot(now, Weekday::Mon)),
        _ => Some(next_hour_slot(now, schedule.hour_slots())),
    }
}

/// Delay in seconds until the next run, for the queue's delayed enqueue.
/// Clamped so the queue never receives a zero or near-zero delay.
pub fn next_delay_secs(schedule: Schedule, now_millis: i64) -> Option<i64> {
    let next = next_run_millis(schedule, now_millis)?;
    Some(((next - now_millis) / 1000).max(MIN_DELAY_SECS))
}

fn next_hour_slot(now: DateTime<Utc>, slots: &[u32]) -> i64 {
    let today = now.date_naive();
    for &hour in slots {
        let candidate = today.and_time(slot_time(hour)).and_utc();
        if candidate > now {
            return candidate.timestamp_millis();
        }
    }

    // No slot left today: first slot on the following day
    let first = slots.first().copied().unwrap_or(0);
    (today + Duration::days(1))
        .and_time(slot_time(first))
        .and_utc()
        .timestamp_millis()
}

fn next_weekday_slot(now: DateTime<Utc>, target: Weekday) -> i64 {
    let today = now.date_naive();
    let days_ahead = (target.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);

    let mut candidate = (today + Duration::days(days_ahead))
        .and_time(NaiveTime::MIN)
        .and_utc();
    if candidate <= now {
        candidate = candidate + Duration::days(7);
    }
    candidate.timestamp_millis()
}

fn slot_time(hour: u32) -> NaiveTime {
    // Slot tables only hold 0..=23
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .expect("valid test instant")
            .timestamp_millis()
    }

    #[test]
    fn test_disabled_never_fires() {
        assert_eq!(next_run_millis(Schedule::Disabled, at(2024, 1, 1, 5, 0, 0)), None);
        assert_eq!(next_delay_secs(Schedule::Disabled, at(2024, 1, 1, 5, 0, 0)), None);
    }

    #[test]
    fn test_every6hours_next_slot() {
        assert_eq!(
            next_run_millis(Schedule::Every6Hours, at(2024, 1, 1, 5, 0, 0)),
            Some(at(2024, 1, 1, 6, 0, 0))
        );
    }

    #[test]
    fn test_every6hours_rolls_to_next_day() {
        assert_eq!(
            next_run_millis(Schedule::Every6Hours, at(2024, 1, 1, 23, 0, 0)),
            Some(at(2024, 1, 2, 0, 0, 0))
        );
    }

    #[test]
    fn test_exactly_on_slot_advances_to_next_occurrence() {
        // 02:00:00 sharp must not return the same instant
        assert_eq!(
            next_run_millis(Schedule::Daily2am, at(2024, 1, 1, 2, 0, 0)),
            Some(at(2024, 1, 2, 2, 0, 0))
        );
    }

    #[test]
    fn test_seconds_past_slot_also_advance() {
        assert_eq!(
            next_run_millis(Schedule::Daily2am, at(2024, 1, 1, 2, 0, 1)),
            Some(at(2024, 1, 2, 2, 0, 0))
        );
    }

    #[test]
    fn test_daily_always_lands_on_midnight() {
        assert_eq!(
            next_run_millis(Schedule::Daily, at(2024, 6, 30, 13, 45, 12)),
            Some(at(2024, 7, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_every12hours_slots() {
        assert_eq!(
            next_run_millis(Schedule::Every12Hours, at(2024, 1, 1, 11, 59, 59)),
            Some(at(2024, 1, 1, 12, 0, 0))
        );
        assert_eq!(
            next_run_millis(Schedule::Every12Hours, at(2024, 1, 1, 12, 0, 0)),
            Some(at(2024, 1, 2, 0, 0, 0))
        );
    }

    #[test]
    fn test_weekly_from_a_wednesday() {
        // 2024-01-03 is a Wednesday; next Monday is 2024-01-08
        assert_eq!(
            next_run_millis(Schedule::Weekly, at(2024, 1, 3, 10, 0, 0)),
            Some(at(2024, 1, 8, 0, 0, 0))
        );
    }

    #[test]
    fn test_weekly_exactly_on_monday_midnight_advances_a_week() {
        // 2024-01-01 is a Monday
        assert_eq!(
            next_run_millis(Schedule::Weekly, at(2024, 1, 1, 0, 0, 0)),
            Some(at(2024, 1, 8, 0, 0, 0))
        );
    }

    #[test]
    fn test_weekly_later_on_monday_goes_to_next_monday() {
        assert_eq!(
            next_run_millis(Schedule::Weekly, at(2024, 1, 1, 8, 30, 0)),
            Some(at(2024, 1, 8, 0, 0, 0))
        );
    }

    #[test]
    fn test_next_run_is_always_strictly_after_now_and_slot_aligned() {
        let schedules = [
            Schedule::Every6Hours,
            Schedule::Every12Hours,
            Schedule::Daily,
            Schedule::Daily2am,
            Schedule::Weekly,
        ];
        let instants = [
            at(2024, 1, 1, 0, 0, 0),
            at(2024, 2, 29, 23, 59, 59),
            at(2024, 12, 31, 18, 0, 0),
            at(2025, 7, 14, 2, 0, 0),
        ];

        for schedule in schedules {
            for now in instants {
                let next = next_run_millis(schedule, now).expect("enabled schedule");
                assert!(next > now, "{schedule} returned a non-future instant");

                let dt = DateTime::from_timestamp_millis(next).expect("valid instant");
                assert_eq!(dt.time().minute(), 0);
                assert_eq!(dt.time().second(), 0);
                match schedule {
                    Schedule::Weekly => {
                        assert_eq!(dt.weekday(), Weekday::Mon);
                        assert_eq!(dt.time().hour(), 0);
                    }
                    _ => assert!(schedule.hour_slots().contains(&dt.time().hour())),
                }
            }
        }
    }

    #[test]
    fn test_delay_is_clamped_to_the_floor() {
        // 30 seconds before the slot: raw delay would be 30s
        let delay = next_delay_secs(Schedule::Daily2am, at(2024, 1, 1, 1, 59, 30));
        assert_eq!(delay, Some(MIN_DELAY_SECS));
    }

    #[test]
    fn test_delay_above_floor_is_untouched() {
        let delay = next_delay_secs(Schedule::Daily2am, at(2024, 1, 1, 0, 0, 0));
        assert_eq!(delay, Some(2 * 60 * 60));
    }

    #[test]
    fn test_schedule_round_trips_through_parse() {
        for schedule in [
            Schedule::Disabled,
            Schedule::Every6Hours,
            Schedule::Every12Hours,
            Schedule::Daily,
            Schedule::Daily2am,
            Schedule::Weekly,
        ] {
            assert_eq!(Schedule::parse(schedule.as_str()).unwrap(), schedule);
        }
        assert!(Schedule::parse("hourly").is_err());
    }
}
