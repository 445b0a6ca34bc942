use crate::{
    configuration::{Configuration, Credentials, EmailSettings, Pacing},
    error::ReservationError,
    types::TimeSlot,
    webdriver::{BrowserKind, WebDriverSettings},
};
use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_LOGIN_URL: &str =
    "https://www.condomisoft.com/system/login.php?sin_apps=true&plataforma=";
pub const DEFAULT_RESERVATION_URL: &str = "https://www.condomisoft.com/system/detalle_recursos.php?id_recurso=1780&nombre_recurso=GIMNASIO%20CUARTO%20PILATES%20Y%20%20SAL%C3%93N%20AEROBI";

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Run one reservation attempt now.
    Run,
    /// Wait until the target date becomes bookable, then run once.
    Hold,
    /// Run on every gym day at the trigger time, forever.
    Schedule,
    /// Send a test notification and exit.
    TestEmail,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "gym_reservation",
    version,
    about = "Reserves the early-morning gym slots on Condomisoft"
)]
pub struct ConfigurationHandler {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long, global = true, env = "CONDOMISOFT_USERNAME", hide_env_values = true)]
    username: Option<String>,

    #[arg(long, global = true, env = "CONDOMISOFT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, global = true, env = "CONDOMISOFT_LOGIN_URL", default_value = DEFAULT_LOGIN_URL)]
    login_url: String,

    #[arg(long, global = true, env = "CONDOMISOFT_RESERVATION_URL", default_value = DEFAULT_RESERVATION_URL)]
    reservation_url: String,

    #[arg(long, global = true, env = "GYM_APARTMENT", default_value = "G-502")]
    apartment: String,

    #[arg(
        long,
        global = true,
        env = "GYM_TIME_SLOTS",
        value_delimiter = ',',
        default_value = "07:30-08:00,08:00-08:30"
    )]
    time_slots: Vec<TimeSlot>,

    #[arg(
        long,
        global = true,
        env = "GYM_DAYS",
        value_delimiter = ',',
        default_value = "mon,wed,fri"
    )]
    gym_days: Vec<Weekday>,

    #[arg(long, global = true, env = "GYM_TIMEZONE", default_value = "America/Mexico_City")]
    timezone: Tz,

    /// Wall-clock time at which `schedule` fires on gym days.
    #[arg(long, global = true, env = "GYM_TRIGGER_TIME", default_value = "00:01")]
    trigger_time: NaiveTime,

    /// Seconds to wait past midnight before a held run starts.
    #[arg(long, global = true, env = "GYM_HOLD_BUFFER_SECS", default_value_t = 5)]
    hold_buffer_secs: u64,

    /// Scales every fixed pause between browser interactions.
    #[arg(long, global = true, env = "GYM_PAUSE_FACTOR", default_value_t = 1.0)]
    pause_factor: f64,

    #[arg(long, global = true, env = "GYM_ELEMENT_TIMEOUT_SECS", default_value_t = 20)]
    element_timeout_secs: u64,

    #[arg(long, global = true, env = "SCREENSHOT_DIR")]
    screenshot_dir: Option<PathBuf>,

    #[arg(long, global = true, value_enum, env = "GYM_BROWSER", default_value = "auto")]
    browser: BrowserKind,

    #[arg(long, global = true, env = "CHROMEDRIVER_URL", default_value = "http://localhost:9515")]
    chromedriver_url: String,

    #[arg(long, global = true, env = "GECKODRIVER_URL", default_value = "http://localhost:4444")]
    geckodriver_url: String,

    /// Show the browser window instead of running headless.
    #[arg(long, global = true)]
    headed: bool,

    #[arg(long, global = true, env = "GYM_PAGE_LOAD_TIMEOUT_SECS", default_value_t = 30)]
    page_load_timeout_secs: u64,

    #[arg(long, global = true, env = "GYM_IMPLICIT_WAIT_SECS", default_value_t = 10)]
    implicit_wait_secs: u64,

    #[arg(long, global = true, env = "EMAIL_HOST", default_value = "smtp.gmail.com")]
    email_host: String,

    #[arg(long, global = true, env = "EMAIL_PORT", default_value_t = 587)]
    email_port: u16,

    #[arg(long, global = true, env = "EMAIL_USER")]
    email_user: Option<String>,

    #[arg(long, global = true, env = "EMAIL_PASSWORD", hide_env_values = true)]
    email_password: Option<String>,

    #[arg(long, global = true, env = "EMAIL_TO")]
    email_to: Option<String>,

    /// Write notifications as .eml files into this directory instead of sending them.
    #[arg(long, global = true, env = "EMAIL_OUTBOX_DIR")]
    email_outbox_dir: Option<PathBuf>,

    /// Print the run report as JSON.
    #[arg(long, global = true)]
    json: bool,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        Self::parse()
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    pub fn json(&self) -> bool {
        self.json
    }

    pub fn webdriver_settings(&self) -> WebDriverSettings {
        WebDriverSettings {
            browser: self.browser,
            chrome_url: self.chromedriver_url.clone(),
            firefox_url: self.geckodriver_url.clone(),
            headless: !self.headed,
            page_load_timeout: Duration::from_secs(self.page_load_timeout_secs),
            implicit_wait: Duration::from_secs(self.implicit_wait_secs),
        }
    }
}

impl Configuration for ConfigurationHandler {
    fn credentials(&self) -> Result<Credentials, ReservationError> {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    fn login_url(&self) -> String {
        self.login_url.clone()
    }

    fn reservation_url(&self) -> String {
        self.reservation_url.clone()
    }

    fn apartment(&self) -> String {
        self.apartment.clone()
    }

    fn time_slots(&self) -> Vec<TimeSlot> {
        self.time_slots.clone()
    }

    fn gym_days(&self) -> Vec<Weekday> {
        self.gym_days.clone()
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn trigger_time(&self) -> NaiveTime {
        self.trigger_time
    }

    fn hold_buffer(&self) -> Duration {
        Duration::from_secs(self.hold_buffer_secs)
    }

    fn pacing(&self) -> Pacing {
        Pacing::default().scaled(self.pause_factor)
    }

    fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    fn screenshot_dir(&self) -> Option<PathBuf> {
        self.screenshot_dir.clone()
    }

    fn email(&self) -> EmailSettings {
        EmailSettings {
            host: self.email_host.clone(),
            port: self.email_port,
            user: self.email_user.clone(),
            password: self.email_password.clone(),
            to: self.email_to.clone().or_else(|| self.email_user.clone()),
            outbox_dir: self.email_outbox_dir.clone(),
        }
    }
}
