//! The browser walk that books the gym: login, apartment, reservation page,
//! calendar day, then reserve and validate each slot.

use chrono::{Datelike, NaiveDate, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use std::{path::PathBuf, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    browser::BrowserSession,
    clock::Clock,
    configuration::{Configuration, Credentials, Pacing},
    error::ReservationError,
    locators::{
        clickable_around, locate, Intent, ADVANCE_ERROR_TEXT, ADVANCE_ERROR_URL_MARKER,
        APOLOGY_PAGE_MARKER, AVAILABLE_LABEL, CONFIRMED_LABEL, HIDE_AUTOMATION_SCRIPT,
        LOGIN_PAGE_MARKER, OCCUPIED_LABELS,
    },
    target_date::near_term_date,
    types::{ReservationRun, SlotResult, TimeSlot},
};

pub const MAX_MONTH_ADVANCES: usize = 12;
const OVERVIEW_LIMIT: usize = 10;
const ENTER_KEY: &str = "\u{e007}";

const SPANISH_MONTHS: [(&str, u32); 13] = [
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

lazy_static! {
    static ref YEAR_PATTERN: Regex = Regex::new(r"\b(20\d{2})\b").unwrap();
}

/// Everything a reservation walk needs, validated before a browser exists.
#[derive(Debug, Clone)]
pub struct ReservationSettings {
    pub credentials: Credentials,
    pub login_url: String,
    pub reservation_url: String,
    pub apartment: String,
    pub gym_days: Vec<Weekday>,
    pub pacing: Pacing,
    pub element_timeout: Duration,
    pub screenshot_dir: Option<PathBuf>,
}

impl ReservationSettings {
    pub fn from_configuration<C: Configuration>(
        configuration: &C,
    ) -> Result<Self, ReservationError> {
        Ok(Self {
            credentials: configuration.credentials()?,
            login_url: configuration.login_url(),
            reservation_url: configuration.reservation_url(),
            apartment: configuration.apartment(),
            gym_days: configuration.gym_days(),
            pacing: configuration.pacing(),
            element_timeout: configuration.element_timeout(),
            screenshot_dir: configuration.screenshot_dir(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationState {
    Init,
    LoggedIn,
    ApartmentSelected,
    OnReservationPage,
    CalendarDaySelected,
    SlotAttempted(TimeSlot),
    SlotValidated(TimeSlot),
    RunComplete,
}

pub struct Reservation<'a, S: BrowserSession> {
    session: S,
    settings: &'a ReservationSettings,
    clock: &'a dyn Clock,
    state: ReservationState,
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}

impl<'a, S: BrowserSession> Reservation<'a, S> {
    pub fn new(session: S, settings: &'a ReservationSettings, clock: &'a dyn Clock) -> Self {
        Self {
            session,
            settings,
            clock,
            state: ReservationState::Init,
        }
    }

    pub fn state(&self) -> &ReservationState {
        &self.state
    }

    fn transition(&mut self, next: ReservationState) {
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }

    /// Books every slot of `run` on its target date, recording one result per
    /// slot. Setup failures propagate; slot failures are recorded and the walk
    /// moves on. Fails with `AllSlotsFailed` when nothing was booked.
    pub async fn make_reservations(
        &mut self,
        run: &mut ReservationRun,
    ) -> Result<(), ReservationError> {
        self.login().await?;
        self.select_apartment().await?;
        self.navigate_to_reservation().await?;

        let target = run.target_date();
        let slots = run.slots();

        let day_selected = match self.select_calendar_day(target).await? {
            true => self.check_advance_window().await.map(|()| true),
            false => Ok(false),
        };
        let failure = match day_selected {
            Ok(true) => None,
            Ok(false) => Some(format!("Could not select calendar day {target}")),
            Err(err @ ReservationError::AdvanceWindow) => Some(err.to_string()),
            Err(err) => return Err(err),
        };
        if let Some(message) = failure {
            error!(
                %target,
                reason = %message,
                "No calendar day selected, no slot can be attempted"
            );
            for slot in &slots {
                run.record(slot, SlotResult::failed(message.clone()));
            }
            self.transition(ReservationState::RunComplete);
            return Err(ReservationError::AllSlotsFailed(slots.len()));
        }

        for (index, slot) in slots.iter().enumerate() {
            info!(%slot, "Attempting to reserve");
            let (result, interrupted) = match self.attempt_slot(slot).await {
                Ok(result) => (result, false),
                Err(err) => {
                    error!(%slot, ?err, "Exception during reservation");
                    (SlotResult::failed(format!("Exception: {err}")), true)
                }
            };
            if result.success {
                info!(%slot, detail = %result.message, "Reservation validated");
            } else {
                error!(%slot, detail = %result.message, "Reservation failed");
                self.capture_screenshot(slot, target).await;
            }
            run.record(slot, result);

            let more_slots = index + 1 < slots.len();
            if more_slots && (interrupted || self.stranded().await) {
                self.return_to_calendar(target).await;
            }
            pause(self.settings.pacing.page).await;
        }
        self.transition(ReservationState::RunComplete);

        let succeeded = run.results().values().filter(|result| result.success).count();
        info!(succeeded, total = slots.len(), "Reservation process completed");
        match succeeded {
            0 => Err(ReservationError::AllSlotsFailed(slots.len())),
            _ => Ok(()),
        }
    }

    async fn attempt_slot(&mut self, slot: &TimeSlot) -> Result<SlotResult, ReservationError> {
        self.transition(ReservationState::SlotAttempted(slot.clone()));
        if !self.reserve_time_slot(slot).await? {
            return Ok(SlotResult::failed("Failed to find available time slot"));
        }
        let result = self.validate_reservation(slot).await;
        self.transition(ReservationState::SlotValidated(slot.clone()));
        Ok(result)
    }

    pub async fn login(&mut self) -> Result<(), ReservationError> {
        info!(url = %self.settings.login_url, "Navigating to login page");
        self.session.goto(&self.settings.login_url).await?;
        pause(self.settings.pacing.page).await;
        if let Err(err) = self.session.execute(HIDE_AUTOMATION_SCRIPT).await {
            debug!(?err, "Could not hide the automation flag");
        }

        if locate(&self.session, &Intent::LoggedInMarker).await?.is_found() {
            info!("Session is already logged in");
            self.transition(ReservationState::LoggedIn);
            return Ok(());
        }

        let username = locate(&self.session, &Intent::UsernameField)
            .await?
            .first()
            .ok_or_else(|| ReservationError::ElementNotFound(Intent::UsernameField.to_string()))?;
        let password = locate(&self.session, &Intent::PasswordField)
            .await?
            .first()
            .ok_or_else(|| ReservationError::ElementNotFound(Intent::PasswordField.to_string()))?;

        let credentials = &self.settings.credentials;
        self.session.clear(&username).await?;
        self.session.send_keys(&username, &credentials.username).await?;
        self.session.clear(&password).await?;
        self.session.send_keys(&password, &credentials.password).await?;

        match locate(&self.session, &Intent::SubmitLogin).await?.first() {
            Some(submit) => self.session.click(&submit).await?,
            None => {
                debug!("No submit control, pressing Enter in the password field");
                self.session.send_keys(&password, ENTER_KEY).await?;
            }
        }
        pause(self.settings.pacing.login).await;

        let url = self.session.current_url().await?;
        if !url.contains(LOGIN_PAGE_MARKER)
            || locate(&self.session, &Intent::LoggedInMarker).await?.is_found()
        {
            info!(%url, "Login successful");
            self.transition(ReservationState::LoggedIn);
            return Ok(());
        }

        let reason = match locate(&self.session, &Intent::LoginErrorMessage).await?.first() {
            Some(message) => self.session.text(&message).await?,
            None => "still on the login page".to_string(),
        };
        error!(%url, %reason, "Login failed");
        Err(ReservationError::Authentication(reason))
    }

    pub async fn select_apartment(&mut self) -> Result<(), ReservationError> {
        pause(self.settings.pacing.page).await;
        let settings = self.settings;
        let apartment = settings.apartment.as_str();
        let intent = Intent::Apartment(apartment);

        let Some(element) = locate(&self.session, &intent).await?.first() else {
            error!(apartment, "Apartment not found on the page");
            if let Err(err) = self.log_page_overview().await {
                warn!(?err, "Could not inspect the page");
            }
            return Err(ReservationError::ElementNotFound(intent.to_string()));
        };

        let tag = self.session.tag_name(&element).await?.to_lowercase();
        let target = match tag.as_str() {
            "button" | "a" => element,
            _ => self
                .session
                .find_all_in(&element, &clickable_around())
                .await?
                .into_iter()
                .next()
                .unwrap_or(element),
        };

        self.session.scroll_into_view(&target).await?;
        pause(self.settings.pacing.settle).await;
        self.session.click(&target).await?;
        pause(self.settings.pacing.page).await;
        info!(apartment, "Apartment selected");
        self.transition(ReservationState::ApartmentSelected);
        Ok(())
    }

    async fn log_page_overview(&self) -> Result<(), ReservationError> {
        let rows = locate(&self.session, &Intent::TableRows).await?.into_vec();
        info!(count = rows.len(), "Table rows on the page");
        for (index, row) in rows.iter().take(OVERVIEW_LIMIT).enumerate() {
            let text = self.session.text(row).await?;
            info!(index, %text, "Row");
        }
        let buttons = locate(&self.session, &Intent::Buttons).await?.into_vec();
        info!(count = buttons.len(), "Buttons on the page");
        for (index, button) in buttons.iter().take(OVERVIEW_LIMIT).enumerate() {
            let text = self.session.text(button).await?;
            info!(index, %text, "Button");
        }
        Ok(())
    }

    pub async fn navigate_to_reservation(&mut self) -> Result<(), ReservationError> {
        info!(url = %self.settings.reservation_url, "Navigating to reservation page");
        self.session.goto(&self.settings.reservation_url).await?;
        let body = &Intent::PageBody.chain()[0];
        if !self
            .session
            .wait_for(body, self.settings.element_timeout)
            .await?
        {
            warn!("Reservation page did not become ready in time");
        }
        pause(self.settings.pacing.page).await;
        self.transition(ReservationState::OnReservationPage);
        Ok(())
    }

    /// Moves the calendar to the month of `target` and clicks its day, or the
    /// first available day when `target` is not offered. `Ok(false)` when the
    /// calendar shows no available day at all.
    pub async fn select_calendar_day(
        &mut self,
        target: NaiveDate,
    ) -> Result<bool, ReservationError> {
        info!(%target, "Selecting calendar day");
        self.advance_to_month(target).await?;

        let days = locate(&self.session, &Intent::AvailableDays).await?.into_vec();
        if days.is_empty() {
            warn!(%target, "No available days in the calendar");
            return Ok(false);
        }

        let mut texts = Vec::with_capacity(days.len());
        for day in &days {
            texts.push(self.session.text(day).await?.trim().to_string());
        }
        info!(
            count = days.len(),
            first = ?texts.iter().take(OVERVIEW_LIMIT).collect::<Vec<_>>(),
            "Available calendar days"
        );

        let Some((index, exact)) = pick_calendar_day(&texts, target.day()) else {
            return Ok(false);
        };
        if exact {
            info!(day = %texts[index], "Found target day");
        } else {
            warn!(
                target_day = target.day(),
                day = %texts[index],
                "Target day not available, using first available day"
            );
        }

        self.session.click(&days[index]).await?;
        pause(self.settings.pacing.action).await;
        self.transition(ReservationState::CalendarDaySelected);
        Ok(true)
    }

    /// Clicks "next month" until the caption shows the month of `target`.
    /// Stops early when the caption or the control cannot be read.
    pub async fn advance_to_month(&mut self, target: NaiveDate) -> Result<(), ReservationError> {
        let wanted = (target.year(), target.month());
        for _ in 0..MAX_MONTH_ADVANCES {
            let caption = locate(&self.session, &Intent::CalendarCaption).await?.first();
            let Some(caption) = caption else {
                debug!("No calendar caption, staying on the displayed month");
                return Ok(());
            };
            let text = self.session.text(&caption).await?;
            let Some(shown) = parse_month_caption(&text) else {
                debug!(caption = %text, "Unreadable calendar caption");
                return Ok(());
            };
            if shown >= wanted {
                return Ok(());
            }
            let Some(next) = locate(&self.session, &Intent::MonthAdvance).await?.first() else {
                warn!(caption = %text, "No next-month control, staying on the displayed month");
                return Ok(());
            };
            debug!(caption = %text, "Advancing calendar by one month");
            self.session.click(&next).await?;
            pause(self.settings.pacing.page).await;
        }
        warn!(%target, "Gave up advancing the calendar");
        Ok(())
    }

    pub async fn advance_error_present(&self) -> Result<bool, ReservationError> {
        let url = self.session.current_url().await?;
        if url.contains(ADVANCE_ERROR_URL_MARKER) {
            return Ok(true);
        }
        if url.contains(APOLOGY_PAGE_MARKER) {
            debug!(%url, "Site shows an apology page");
        }
        Ok(self.session.page_text().await?.contains(ADVANCE_ERROR_TEXT))
    }

    async fn check_advance_window(&mut self) -> Result<(), ReservationError> {
        if self.advance_error_present().await? {
            self.recover_from_advance_error().await?;
        }
        Ok(())
    }

    /// Leaves the "more than 7 days" page and selects the next gym day that is
    /// certainly inside the window. Fails with `AdvanceWindow` if that does
    /// not clear the rejection.
    pub async fn recover_from_advance_error(&mut self) -> Result<(), ReservationError> {
        warn!("Detected '7 days in advance' rejection, returning to the calendar");
        match locate(&self.session, &Intent::ReturnButton).await?.first() {
            Some(back) => {
                self.session.click(&back).await?;
                pause(self.settings.pacing.page).await;
            }
            None => warn!("No return button on the rejection page"),
        }
        self.navigate_to_reservation().await?;

        let near = near_term_date(&self.clock.now(), &self.settings.gym_days);
        info!(%near, "Retrying with near-term date");
        if !self.select_calendar_day(near).await? || self.advance_error_present().await? {
            return Err(ReservationError::AdvanceWindow);
        }
        Ok(())
    }

    async fn click_slot_action(&mut self, slot: &TimeSlot) -> Result<bool, ReservationError> {
        let Some(action) = locate(&self.session, &Intent::SlotAction(slot)).await?.first() else {
            warn!(%slot, "No available slot found");
            return Ok(false);
        };
        self.session.scroll_into_view(&action).await?;
        pause(self.settings.pacing.settle).await;
        self.session.click(&action).await?;
        pause(self.settings.pacing.action).await;
        Ok(true)
    }

    /// Clicks the slot and confirms it. A rejection after either click is
    /// recovered once onto the near-term day and the slot is tried again
    /// there; a second rejection is `AdvanceWindow`. `Ok(false)` when nothing
    /// actionable exists for `slot`.
    pub async fn reserve_time_slot(&mut self, slot: &TimeSlot) -> Result<bool, ReservationError> {
        let mut recovered = false;
        loop {
            if !self.click_slot_action(slot).await? {
                return Ok(false);
            }
            if self.recover_for_retry(&mut recovered).await? {
                info!(%slot, "Retrying slot on the near-term day");
                continue;
            }
            self.confirm_reservation(slot).await?;
            if self.recover_for_retry(&mut recovered).await? {
                info!(%slot, "Retrying slot on the near-term day");
                continue;
            }
            return Ok(true);
        }
    }

    async fn recover_for_retry(&mut self, recovered: &mut bool) -> Result<bool, ReservationError> {
        if !self.advance_error_present().await? {
            return Ok(false);
        }
        if *recovered {
            return Err(ReservationError::AdvanceWindow);
        }
        self.recover_from_advance_error().await?;
        *recovered = true;
        Ok(true)
    }

    async fn confirm_reservation(&mut self, slot: &TimeSlot) -> Result<(), ReservationError> {
        match locate(&self.session, &Intent::ConfirmButton).await?.first() {
            Some(confirm) => {
                self.session.click(&confirm).await?;
                info!(%slot, "Clicked confirmation button");
                pause(self.settings.pacing.action).await;
            }
            None => {
                info!(%slot, "Reservation initiated, no confirmation button");
                pause(self.settings.pacing.page).await;
            }
        }
        Ok(())
    }

    async fn stranded(&self) -> bool {
        self.advance_error_present().await.unwrap_or(true)
    }

    /// Puts the browser back on the reservation page with `target` selected,
    /// so the next slot starts from the table. Failures are only logged.
    async fn return_to_calendar(&mut self, target: NaiveDate) {
        warn!(%target, "Returning to the reservation calendar before the next slot");
        match self.reopen_calendar(target).await {
            Ok(true) => {}
            Ok(false) => warn!(%target, "No calendar day selected after returning"),
            Err(err) => warn!(?err, "Could not return to the reservation calendar"),
        }
    }

    async fn reopen_calendar(&mut self, target: NaiveDate) -> Result<bool, ReservationError> {
        if let Some(back) = locate(&self.session, &Intent::ReturnButton).await?.first() {
            self.session.click(&back).await?;
            pause(self.settings.pacing.page).await;
        }
        self.navigate_to_reservation().await?;
        self.select_calendar_day(target).await
    }

    /// Reloads the page and reads the slot's row. Never fails: anything
    /// unexpected becomes a failed result carrying what was seen.
    pub async fn validate_reservation(&self, slot: &TimeSlot) -> SlotResult {
        info!(%slot, "Validating reservation");
        match self.read_slot_status(slot).await {
            Ok(result) => result,
            Err(err) => {
                error!(%slot, ?err, "Failed to validate reservation");
                SlotResult::failed(format!("Validation error: {err}"))
            }
        }
    }

    async fn read_slot_status(&self, slot: &TimeSlot) -> Result<SlotResult, ReservationError> {
        self.session.refresh().await?;
        pause(self.settings.pacing.action).await;

        let apartment = self.settings.apartment.as_str();
        let confirmed = Intent::SlotConfirmed { slot, apartment };
        if locate(&self.session, &confirmed).await?.is_found() {
            return Ok(SlotResult::confirmed("Confirmed successfully"));
        }
        if locate(&self.session, &Intent::SlotStillAvailable(slot))
            .await?
            .is_found()
        {
            return Ok(SlotResult::failed(
                "Time slot still available - reservation not successful",
            ));
        }
        match locate(&self.session, &Intent::SlotRow(slot)).await?.first() {
            Some(row) => {
                let text = self.session.text(&row).await?;
                debug!(%slot, %text, "Slot row content");
                Ok(classify_row_text(&text, apartment))
            }
            None => Ok(SlotResult::failed("Time slot not found in table")),
        }
    }

    pub async fn capture_screenshot(&self, slot: &TimeSlot, target: NaiveDate) {
        let Some(directory) = &self.settings.screenshot_dir else {
            return;
        };
        let path = directory.join(format!(
            "failed_{target}_{}.png",
            slot.as_str().replace(':', "")
        ));
        let written = async {
            let png = self.session.screenshot().await?;
            tokio::fs::create_dir_all(directory)
                .await
                .map_err(|err| ReservationError::Driver(err.to_string()))?;
            tokio::fs::write(&path, png)
                .await
                .map_err(|err| ReservationError::Driver(err.to_string()))?;
            Ok::<_, ReservationError>(())
        };
        match written.await {
            Ok(()) => info!(path = %path.display(), "Saved screenshot"),
            Err(err) => warn!(?err, "Could not save screenshot"),
        }
    }

    pub async fn close(self) -> Result<(), ReservationError> {
        self.session.close().await?;
        info!("Browser session closed");
        Ok(())
    }
}

/// Status of a slot row that shows neither the confirmation marker nor an
/// available button.
pub fn classify_row_text(text: &str, apartment: &str) -> SlotResult {
    if text.contains(CONFIRMED_LABEL) {
        return match text.contains(apartment) {
            true => SlotResult::confirmed("Confirmed successfully"),
            false => SlotResult::failed("Time slot confirmed for different apartment"),
        };
    }
    if OCCUPIED_LABELS.iter().any(|label| text.contains(label)) {
        return SlotResult::failed("Time slot occupied by another user");
    }
    if text.contains(AVAILABLE_LABEL) {
        return SlotResult::failed("Time slot still available - reservation not successful");
    }
    SlotResult::failed(format!("Unexpected status: {}", text.trim()))
}

/// Index of the cell showing `day` (also as `09`), else the first cell.
/// The flag tells whether the match was exact.
pub fn pick_calendar_day(texts: &[String], day: u32) -> Option<(usize, bool)> {
    let plain = day.to_string();
    let padded = format!("{day:02}");
    texts
        .iter()
        .position(|text| *text == plain || *text == padded)
        .map(|index| (index, true))
        .or_else(|| (!texts.is_empty()).then_some((0, false)))
}

/// Reads a caption such as "Noviembre 2026" as `(year, month)`.
pub fn parse_month_caption(caption: &str) -> Option<(i32, u32)> {
    let lower = caption.to_lowercase();
    let month = SPANISH_MONTHS
        .iter()
        .find(|(name, _)| lower.contains(name))
        .map(|(_, month)| *month)?;
    let year = YEAR_PATTERN
        .captures(&lower)
        .and_then(|captures| captures[1].parse().ok())?;
    Some((year, month))
}
