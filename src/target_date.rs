//! Which calendar date to book.
//!
//! The site only accepts reservations up to 7 days ahead, and a date becomes
//! bookable at midnight exactly one week before it. A run started late in the
//! evening is treated as belonging to the next day, because it is waiting for
//! that midnight.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Weekday};
use chrono_tz::Tz;
use tracing::info;

pub const BOOKING_WINDOW_DAYS: i64 = 7;
pub const LATE_EVENING_HOUR: u32 = 23;

pub fn base_day(now: &DateTime<Tz>) -> NaiveDate {
    let today = now.date_naive();
    if now.hour() >= LATE_EVENING_HOUR {
        today + Duration::days(1)
    } else {
        today
    }
}

/// Days from `from` to the first gym day on or after it.
fn days_until_gym_day(from: NaiveDate, gym_days: &[Weekday]) -> i64 {
    (0..BOOKING_WINDOW_DAYS)
        .find(|offset| gym_days.contains(&(from + Duration::days(*offset)).weekday()))
        .unwrap_or(0)
}

/// The date exactly one week after the next gym day.
pub fn target_date(now: &DateTime<Tz>, gym_days: &[Weekday]) -> NaiveDate {
    let base = base_day(now);
    let next_gym_day = base + Duration::days(days_until_gym_day(base, gym_days));
    let target = next_gym_day + Duration::days(BOOKING_WINDOW_DAYS);

    info!(
        now = %now.format("%Y-%m-%d %H:%M:%S %Z"),
        base_day = %base.format("%Y-%m-%d (%A)"),
        next_gym_day = %next_gym_day.format("%Y-%m-%d (%A)"),
        target = %target.format("%Y-%m-%d (%A)"),
        "Computed target date"
    );
    target
}

/// Date used after the site rejected a booking as too far ahead: the next gym
/// day strictly after today, which is always inside the window.
pub fn near_term_date(now: &DateTime<Tz>, gym_days: &[Weekday]) -> NaiveDate {
    let today = now.date_naive();
    let offset = (1..=BOOKING_WINDOW_DAYS)
        .find(|offset| gym_days.contains(&(today + Duration::days(*offset)).weekday()))
        .unwrap_or(BOOKING_WINDOW_DAYS);
    today + Duration::days(offset)
}
