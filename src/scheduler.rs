//! When runs happen: right away, held until the target date opens, or on
//! every gym day at a fixed wall-clock time.

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday,
};
use chrono_tz::Tz;
use tokio::time::sleep;
use tracing::info;

use crate::{
    browser::BrowserLauncher,
    clock::Clock,
    configuration::Configuration,
    error::ReservationError,
    notification::Notifier,
    runner::run_reservation,
    target_date::{target_date, BOOKING_WINDOW_DAYS},
    types::RunReport,
};

const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(60);

fn resolve_local(timezone: Tz, local: NaiveDateTime) -> DateTime<Tz> {
    timezone
        .from_local_datetime(&local)
        .earliest()
        .unwrap_or_else(|| timezone.from_utc_datetime(&local))
}

/// Midnight of the day `target` enters the booking window, plus `buffer`.
pub fn bookable_at(target: NaiveDate, buffer: std::time::Duration, timezone: Tz) -> DateTime<Tz> {
    let opening = target - Duration::days(BOOKING_WINDOW_DAYS);
    let buffer = Duration::from_std(buffer).unwrap_or_else(|_| Duration::zero());
    resolve_local(timezone, opening.and_time(NaiveTime::MIN)) + buffer
}

/// First gym day at `at` strictly after `now`.
pub fn next_trigger(
    now: &DateTime<Tz>,
    gym_days: &[Weekday],
    at: NaiveTime,
) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    (0..=BOOKING_WINDOW_DAYS)
        .map(|offset| today + Duration::days(offset))
        .filter(|day| gym_days.contains(&day.weekday()))
        .map(|day| resolve_local(now.timezone(), day.and_time(at)))
        .find(|candidate| candidate > now)
}

/// Sleeps in bounded steps so a suspended host or a clock change is noticed.
pub async fn sleep_until(clock: &dyn Clock, instant: DateTime<Tz>) {
    info!(until = %instant.format("%Y-%m-%d %H:%M:%S %Z"), "Waiting");
    loop {
        let Ok(remaining) = (instant - clock.now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        sleep(remaining.min(MAX_SLEEP)).await;
    }
}

/// Computes the target now, waits for it to become bookable, then runs once
/// for that same target.
pub async fn hold<C, L, N>(
    configuration: &C,
    clock: &dyn Clock,
    launcher: &L,
    notifier: &N,
) -> RunReport
where
    C: Configuration,
    L: BrowserLauncher,
    N: Notifier,
{
    let target = target_date(&clock.now(), &configuration.gym_days());
    let start = bookable_at(target, configuration.hold_buffer(), configuration.timezone());
    info!(%target, start = %start, "Holding until the target date is bookable");
    sleep_until(clock, start).await;
    run_reservation(configuration, clock, launcher, notifier, Some(target)).await
}

/// Runs on every gym day at the configured trigger time. Only returns when no
/// trigger can be computed.
pub async fn schedule<C, L, N>(
    configuration: &C,
    clock: &dyn Clock,
    launcher: &L,
    notifier: &N,
) -> Result<(), ReservationError>
where
    C: Configuration,
    L: BrowserLauncher,
    N: Notifier,
{
    let gym_days = configuration.gym_days();
    loop {
        let Some(next) = next_trigger(&clock.now(), &gym_days, configuration.trigger_time()) else {
            return Err(ReservationError::Configuration(
                "no gym days configured, nothing to schedule".into(),
            ));
        };
        info!(next = %next, "Next scheduled run");
        sleep_until(clock, next).await;
        let report = run_reservation(configuration, clock, launcher, notifier, None).await;
        info!(outcome = ?report.outcome, "Scheduled run finished");
    }
}
