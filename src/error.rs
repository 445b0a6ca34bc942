use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Login failed: {0}")]
    Authentication(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Reservation rejected: no se acepta reservaciones con más de 7 días de anticipación")]
    AdvanceWindow,

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("All {0} reservations failed")]
    AllSlotsFailed(usize),
}

impl From<fantoccini::error::CmdError> for ReservationError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        ReservationError::Driver(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for ReservationError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        ReservationError::Driver(format!("could not start browser session: {err}"))
    }
}
