//! Where things are on the Condomisoft pages.
//!
//! The site has no stable markup contract, so every element the reservation
//! flow needs is described by an [`Intent`] with an ordered list of fallback
//! locators. The first locator that matches anything wins.

use std::fmt;
use tracing::debug;

use crate::{
    browser::{xpath_literal, BrowserSession, Locator},
    error::ReservationError,
    types::TimeSlot,
};

pub const LOGIN_PAGE_MARKER: &str = "login.php";
pub const APOLOGY_PAGE_MARKER: &str = "apology.php";
pub const ADVANCE_ERROR_URL_MARKER: &str = "m%C3%A1s%20de%207%20d%C3%ADas";
pub const ADVANCE_ERROR_TEXT: &str = "No se acepta reservaciones con más de 7 días";
pub const AVAILABLE_LABEL: &str = "Disponible";
pub const CONFIRMED_LABEL: &str = "Confirmado";
pub const OCCUPIED_LABELS: [&str; 2] = ["Ocupado", "Reservado"];

pub const HIDE_AUTOMATION_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

#[derive(Debug, Clone, Copy)]
pub enum Intent<'a> {
    LoggedInMarker,
    UsernameField,
    PasswordField,
    SubmitLogin,
    LoginErrorMessage,
    Apartment(&'a str),
    PageBody,
    TableRows,
    Buttons,
    CalendarCaption,
    MonthAdvance,
    AvailableDays,
    ReturnButton,
    SlotAction(&'a TimeSlot),
    ConfirmButton,
    SlotConfirmed {
        slot: &'a TimeSlot,
        apartment: &'a str,
    },
    SlotStillAvailable(&'a TimeSlot),
    SlotRow(&'a TimeSlot),
}

impl fmt::Display for Intent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::LoggedInMarker => write!(f, "logged-in marker"),
            Intent::UsernameField => write!(f, "username field"),
            Intent::PasswordField => write!(f, "password field"),
            Intent::SubmitLogin => write!(f, "login submit control"),
            Intent::LoginErrorMessage => write!(f, "login error message"),
            Intent::Apartment(unit) => write!(f, "apartment {unit}"),
            Intent::PageBody => write!(f, "page body"),
            Intent::TableRows => write!(f, "table rows"),
            Intent::Buttons => write!(f, "buttons"),
            Intent::CalendarCaption => write!(f, "calendar caption"),
            Intent::MonthAdvance => write!(f, "next month control"),
            Intent::AvailableDays => write!(f, "available calendar days"),
            Intent::ReturnButton => write!(f, "return button"),
            Intent::SlotAction(slot) => write!(f, "reserve action for {slot}"),
            Intent::ConfirmButton => write!(f, "confirmation button"),
            Intent::SlotConfirmed { slot, apartment } => {
                write!(f, "{slot} confirmed for {apartment}")
            }
            Intent::SlotStillAvailable(slot) => write!(f, "{slot} still available"),
            Intent::SlotRow(slot) => write!(f, "row of {slot}"),
        }
    }
}

impl Intent<'_> {
    pub fn chain(&self) -> Vec<Locator> {
        match *self {
            Intent::LoggedInMarker => vec![Locator::xpath(
                "//a[contains(text(), 'Salir') or contains(text(), 'Logout')]",
            )],
            Intent::UsernameField => vec![
                Locator::name("user"),
                Locator::name("usuario"),
                Locator::xpath("//input[@type='text' or @type='email']"),
            ],
            Intent::PasswordField => vec![
                Locator::name("pass"),
                Locator::name("clave"),
                Locator::xpath("//input[@type='password']"),
            ],
            Intent::SubmitLogin => vec![
                Locator::xpath("//input[@type='submit' and @value='Entrar']"),
                Locator::xpath("//input[@type='submit'] | //button[@type='submit']"),
                Locator::text("button", "Entrar"),
            ],
            Intent::LoginErrorMessage => vec![Locator::xpath(
                "//*[contains(text(), 'error') or contains(text(), 'incorrecto') or contains(text(), 'invalid')]",
            )],
            Intent::Apartment(unit) => apartment_chain(unit),
            Intent::PageBody => vec![Locator::xpath("//body")],
            Intent::TableRows => vec![Locator::xpath("//tr")],
            Intent::Buttons => vec![Locator::xpath("//button | //a[contains(@class, 'btn')]")],
            Intent::CalendarCaption => vec![
                Locator::xpath("//*[contains(@class, 'month') or contains(@class, 'mes')]"),
                Locator::xpath("//table//caption"),
                Locator::xpath("//table//th[@colspan]"),
            ],
            Intent::MonthAdvance => vec![
                Locator::xpath("//a[contains(@title, 'Siguiente') or contains(text(), 'Siguiente')]"),
                Locator::xpath("//a[contains(text(), '»') or contains(text(), '>>')]"),
                Locator::xpath(
                    "//*[@onclick and (contains(text(), '>') or contains(text(), '»'))]",
                ),
            ],
            Intent::AvailableDays => vec![
                Locator::xpath(
                    "//td[contains(@style, 'background-color: #90EE90') or contains(@style, 'background-color: green') or contains(@class, 'available')]",
                ),
                Locator::xpath(
                    "//td[@onclick and text() and string-length(text()) <= 2 and text() != ' ']",
                ),
                Locator::xpath("//td[text() and @onclick and not(contains(@class, 'disabled'))]"),
            ],
            Intent::ReturnButton => vec![
                Locator::text("a", "Regresar"),
                Locator::text("button", "Regresar"),
            ],
            Intent::SlotAction(slot) => slot_action_chain(slot),
            Intent::ConfirmButton => vec![
                Locator::text("button", "Confirmar"),
                Locator::text("button", "Reservar"),
                Locator::text("button", "Aceptar"),
            ],
            Intent::SlotConfirmed { slot, apartment } => {
                let row = row_of(slot);
                let label = xpath_literal(&format!("{CONFIRMED_LABEL} para {apartment}"));
                vec![Locator::xpath(format!("{row}//td[contains(text(), {label})]"))]
            }
            Intent::SlotStillAvailable(slot) => {
                let row = row_of(slot);
                let label = xpath_literal(AVAILABLE_LABEL);
                vec![Locator::xpath(format!(
                    "{row}//button[contains(text(), {label})] | {row}//a[contains(text(), {label})]"
                ))]
            }
            Intent::SlotRow(slot) => vec![Locator::xpath(row_of(slot))],
        }
    }
}

fn row_of(slot: &TimeSlot) -> String {
    format!("//tr[contains(., {})]", xpath_literal(slot.as_str()))
}

fn apartment_chain(unit: &str) -> Vec<Locator> {
    let literal = xpath_literal(unit);
    let mut chain = vec![Locator::xpath(format!(
        "//button[contains(text(), {literal})] | //a[contains(text(), {literal})]"
    ))];

    // Buttons are sometimes rendered as "G - 502".
    if let Some((tower, number)) = unit.split_once('-') {
        let tower = xpath_literal(tower.trim());
        let number = xpath_literal(number.trim());
        let loose = format!("contains(text(), {tower}) and contains(text(), {number})");
        chain.push(Locator::xpath(format!(
            "//button[{loose}] | //a[{loose}]"
        )));
        chain.push(Locator::xpath(format!("//*[{loose}]")));
    } else {
        chain.push(Locator::xpath(format!("//*[contains(text(), {literal})]")));
    }
    chain
}

fn slot_action_chain(slot: &TimeSlot) -> Vec<Locator> {
    let time = xpath_literal(slot.as_str());
    let available = xpath_literal(AVAILABLE_LABEL);
    let row = row_of(slot);
    vec![
        Locator::xpath(format!(
            "//td[contains(text(), {time})]//following-sibling::td//button[contains(text(), {available})]"
        )),
        Locator::xpath(format!(
            "//td[text()={time}]//following-sibling::td//button | //td[text()={time}]//following-sibling::td//a"
        )),
        Locator::xpath(format!(
            "{row}//button[contains(text(), {available})] | {row}//a[contains(text(), {available})]"
        )),
        Locator::xpath(format!(
            "//*[contains(text(), {time}) and (@onclick or @href)]"
        )),
    ]
}

/// Clickable element inside or around a matched element.
pub fn clickable_around() -> Locator {
    Locator::xpath(".//button | .//a | ./ancestor::button | ./ancestor::a")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<E> {
    Found(Vec<E>),
    NotFound,
}

impl<E> Lookup<E> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn first(self) -> Option<E> {
        match self {
            Lookup::Found(elements) => elements.into_iter().next(),
            Lookup::NotFound => None,
        }
    }

    pub fn into_vec(self) -> Vec<E> {
        match self {
            Lookup::Found(elements) => elements,
            Lookup::NotFound => Vec::new(),
        }
    }
}

/// Tries each locator of `intent` in order and returns the first non-empty match.
pub async fn locate<S: BrowserSession>(
    session: &S,
    intent: &Intent<'_>,
) -> Result<Lookup<S::Element>, ReservationError> {
    for (strategy, locator) in intent.chain().iter().enumerate() {
        let found = session.find_all(locator).await?;
        if !found.is_empty() {
            debug!(%intent, strategy, count = found.len(), "Located elements");
            return Ok(Lookup::Found(found));
        }
    }
    debug!(%intent, "No locator strategy matched");
    Ok(Lookup::NotFound)
}
