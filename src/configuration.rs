use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use std::{fmt, path::PathBuf, time::Duration};

use crate::{error::ReservationError, types::TimeSlot};

pub trait Configuration: Clone + Send + Sync + 'static {
    fn credentials(&self) -> Result<Credentials, ReservationError>;
    fn login_url(&self) -> String;
    fn reservation_url(&self) -> String;
    fn apartment(&self) -> String;
    fn time_slots(&self) -> Vec<TimeSlot>;
    fn gym_days(&self) -> Vec<Weekday>;
    fn timezone(&self) -> Tz;
    fn trigger_time(&self) -> NaiveTime;
    fn hold_buffer(&self) -> Duration;
    fn pacing(&self) -> Pacing;
    fn element_timeout(&self) -> Duration;
    fn screenshot_dir(&self) -> Option<PathBuf>;
    fn email(&self) -> EmailSettings;
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Result<Self, ReservationError> {
        let username = username.filter(|value| !value.trim().is_empty());
        let password = password.filter(|value| !value.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok(Self { username, password }),
            _ => Err(ReservationError::Configuration(
                "CONDOMISOFT_USERNAME and CONDOMISOFT_PASSWORD must be set".into(),
            )),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Fixed pauses between browser interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After scrolling an element into view.
    pub settle: Duration,
    /// After navigation, before reading a freshly loaded page.
    pub page: Duration,
    /// After a click that triggers server work.
    pub action: Duration,
    /// After submitting the login form.
    pub login: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            page: Duration::from_secs(2),
            action: Duration::from_secs(3),
            login: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            settle: Duration::ZERO,
            page: Duration::ZERO,
            action: Duration::ZERO,
            login: Duration::ZERO,
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        let factor = factor.max(0.0);
        Self {
            settle: self.settle.mul_f64(factor),
            page: self.page.mul_f64(factor),
            action: self.action.mul_f64(factor),
            login: self.login.mul_f64(factor),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub to: Option<String>,
    pub outbox_dir: Option<PathBuf>,
}
