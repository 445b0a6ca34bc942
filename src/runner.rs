use chrono::NaiveDate;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    browser::BrowserLauncher,
    clock::Clock,
    configuration::Configuration,
    error::ReservationError,
    notification::{compose, Notifier},
    reservation::{Reservation, ReservationSettings},
    target_date::target_date,
    types::{ReservationRun, RunReport},
};

/// One reservation run end to end. Always yields a report and always hands
/// exactly one notification to `notifier`, whatever failed along the way.
pub async fn run_reservation<C, L, N>(
    configuration: &C,
    clock: &dyn Clock,
    launcher: &L,
    notifier: &N,
    target: Option<NaiveDate>,
) -> RunReport
where
    C: Configuration,
    L: BrowserLauncher,
    N: Notifier,
{
    let started_at = clock.now();
    let target = target.unwrap_or_else(|| target_date(&started_at, &configuration.gym_days()));
    let mut run = ReservationRun::new(started_at, target, &configuration.time_slots());
    let span = info_span!("reservation_run", run_id = %run.run_id(), %target);

    async move {
        info!(slots = ?run.slots(), "Starting gym reservation");
        let error = match ReservationSettings::from_configuration(configuration) {
            Ok(settings) => drive(&settings, clock, launcher, &mut run).await.err(),
            Err(err) => {
                error!(?err, "Invalid configuration, no browser started");
                Some(err)
            }
        };

        let report = run.finalize(clock.now(), error.map(|err| err.to_string()));
        info!(
            outcome = ?report.outcome,
            successful = report.successful_slots(),
            duration_secs = report.duration_secs,
            "Reservation run finished"
        );

        let notification = compose(
            &report,
            &configuration.apartment(),
            &configuration.reservation_url(),
        );
        if let Err(err) = notifier.notify(&notification).await {
            error!(?err, "Failed to send notification");
        }
        report
    }
    .instrument(span)
    .await
}

async fn drive<L: BrowserLauncher>(
    settings: &ReservationSettings,
    clock: &dyn Clock,
    launcher: &L,
    run: &mut ReservationRun,
) -> Result<(), ReservationError> {
    let session = launcher.launch().await?;
    let mut reservation = Reservation::new(session, settings, clock);

    let result = reservation.make_reservations(run).await;
    if let Err(err) = &result {
        error!(?err, state = ?reservation.state(), "Reservation process failed");
    }
    if let Err(err) = reservation.close().await {
        warn!(?err, "Could not close browser session");
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        clock::MockClock,
        outcome::RunOutcome,
        testutils::{
            condomisoft_site, test_slots, MockBrowserLauncher, MockBrowserSession, MockNotifier,
            MockSite, SlotBehaviour, TestConfiguration,
        },
    };
    use chrono::TimeZone;
    use chrono_tz::America::Mexico_City;
    use std::sync::atomic::Ordering;

    const DAYS: [&str; 3] = ["21", "23", "26"];

    fn clock() -> MockClock {
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .return_const(Mexico_City.with_ymd_and_hms(2026, 10, 19, 0, 1, 0).unwrap());
        clock
    }

    fn booking_site() -> MockBrowserSession {
        let slots = test_slots();
        condomisoft_site(
            "G-502",
            &DAYS,
            &[
                (slots[0].clone(), SlotBehaviour::Books),
                (slots[1].clone(), SlotBehaviour::Books),
            ],
        )
    }

    #[tokio::test]
    async fn test_successful_run() {
        let session = booking_site();
        let launcher = MockBrowserLauncher::new(session.clone());
        let notifier = MockNotifier::new();

        let report = run_reservation(
            &TestConfiguration::default(),
            &clock(),
            &launcher,
            &notifier,
            None,
        )
        .await;

        assert_eq!(report.outcome, RunOutcome::AllSuccess);
        assert_eq!(report.target_date, NaiveDate::from_ymd_opt(2026, 10, 26).unwrap());
        assert_eq!(report.error, None);
        assert!(session.is_closed());
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].success);
    }

    #[tokio::test]
    async fn test_setup_failure_still_closes_and_notifies() {
        let session = MockBrowserSession::new(MockSite::default());
        let launcher = MockBrowserLauncher::new(session.clone());
        let notifier = MockNotifier::new();

        let report = run_reservation(
            &TestConfiguration::default(),
            &clock(),
            &launcher,
            &notifier,
            None,
        )
        .await;

        assert_eq!(report.outcome, RunOutcome::NoSuccess);
        assert_eq!(
            report.error.as_deref(),
            Some("Element not found: username field")
        );
        assert!(session.is_closed());
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].success);
        assert!(sent[0].html_body.contains("Element not found: username field"));
    }

    #[tokio::test]
    async fn test_missing_credentials_never_launch_browser() {
        let launcher = MockBrowserLauncher::new(booking_site());
        let notifier = MockNotifier::new();
        let configuration = TestConfiguration {
            username: None,
            ..Default::default()
        };

        let report = run_reservation(&configuration, &clock(), &launcher, &notifier, None).await;

        assert_eq!(launcher.calls_to_launch.load(Ordering::SeqCst), 0);
        assert_eq!(report.outcome, RunOutcome::NoSuccess);
        assert!(report.error.unwrap().contains("CONDOMISOFT_USERNAME"));
        assert!(report
            .results
            .values()
            .all(|result| result.message == "Not attempted"));
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_browser_launch_failure() {
        let launcher = MockBrowserLauncher::new(booking_site());
        launcher.success.store(false, Ordering::SeqCst);
        let notifier = MockNotifier::new();

        let report = run_reservation(
            &TestConfiguration::default(),
            &clock(),
            &launcher,
            &notifier,
            None,
        )
        .await;

        assert_eq!(report.outcome, RunOutcome::NoSuccess);
        assert_eq!(
            report.error.as_deref(),
            Some("Browser driver error: Supposed to fail")
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_change_outcome() {
        let launcher = MockBrowserLauncher::new(booking_site());
        let notifier = MockNotifier::new();
        notifier.0.success.store(false, Ordering::SeqCst);

        let report = run_reservation(
            &TestConfiguration::default(),
            &clock(),
            &launcher,
            &notifier,
            None,
        )
        .await;

        assert_eq!(report.outcome, RunOutcome::AllSuccess);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_success_sends_one_notification_with_both_slots() {
        let slots = test_slots();
        let session = condomisoft_site(
            "G-502",
            &DAYS,
            &[
                (slots[0].clone(), SlotBehaviour::Occupied),
                (slots[1].clone(), SlotBehaviour::Books),
            ],
        );
        let launcher = MockBrowserLauncher::new(session.clone());
        let notifier = MockNotifier::new();

        let report = run_reservation(
            &TestConfiguration::default(),
            &clock(),
            &launcher,
            &notifier,
            None,
        )
        .await;

        assert_eq!(report.outcome, RunOutcome::PartialSuccess);
        assert!(session.is_closed());
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html_body.contains("07:30 - 08:00"));
        assert!(sent[0].html_body.contains("08:00 - 08:30"));
        assert!(sent[0].html_body.contains("Failed to find available time slot"));
    }

    #[tokio::test]
    async fn test_explicit_target_is_used() {
        let launcher = MockBrowserLauncher::new(booking_site());
        let notifier = MockNotifier::new();
        let target = NaiveDate::from_ymd_opt(2026, 10, 23).unwrap();

        let report = run_reservation(
            &TestConfiguration::default(),
            &clock(),
            &launcher,
            &notifier,
            Some(target),
        )
        .await;

        assert_eq!(report.target_date, target);
        assert_eq!(report.outcome, RunOutcome::AllSuccess);
    }
}
