use crate::error::ReservationError;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Elements whose `name` attribute equals the value.
    Name(String),
    /// `tag` elements whose own text contains `text`. Use `*` for any tag.
    TextContains { tag: String, text: String },
    /// Compound matches that need a full XPath expression.
    XPath(String),
}

impl Locator {
    pub fn name(name: &str) -> Self {
        Locator::Name(name.into())
    }

    pub fn text(tag: &str, text: &str) -> Self {
        Locator::TextContains {
            tag: tag.into(),
            text: text.into(),
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    pub fn to_xpath(&self) -> String {
        match self {
            Locator::Name(name) => format!("//*[@name={}]", xpath_literal(name)),
            Locator::TextContains { tag, text } => {
                format!("//{tag}[contains(text(), {})]", xpath_literal(text))
            }
            Locator::XPath(expression) => expression.clone(),
        }
    }
}

/// Quotes `value` as an XPath string literal.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|part| format!("'{part}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// The browser operations the reservation flow relies on. One session is
/// owned by one run and must be closed on every exit path.
#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    type Element: Clone;

    async fn goto(&self, url: &str) -> Result<(), ReservationError>;
    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Element>, ReservationError>;
    async fn find_all_in(
        &self,
        parent: &Self::Element,
        locator: &Locator,
    ) -> Result<Vec<Self::Element>, ReservationError>;
    /// Polls until `locator` matches or `timeout` elapses. `Ok(false)` on timeout.
    async fn wait_for(&self, locator: &Locator, timeout: Duration)
        -> Result<bool, ReservationError>;
    async fn click(&self, element: &Self::Element) -> Result<(), ReservationError>;
    async fn clear(&self, element: &Self::Element) -> Result<(), ReservationError>;
    async fn send_keys(&self, element: &Self::Element, text: &str)
        -> Result<(), ReservationError>;
    async fn text(&self, element: &Self::Element) -> Result<String, ReservationError>;
    async fn tag_name(&self, element: &Self::Element) -> Result<String, ReservationError>;
    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), ReservationError>;
    async fn execute(&self, script: &str) -> Result<Value, ReservationError>;
    async fn current_url(&self) -> Result<String, ReservationError>;
    async fn page_text(&self) -> Result<String, ReservationError>;
    async fn refresh(&self) -> Result<(), ReservationError>;
    async fn screenshot(&self) -> Result<Vec<u8>, ReservationError>;
    async fn close(self) -> Result<(), ReservationError>
    where
        Self: Sized;
}

#[allow(async_fn_in_trait)]
pub trait BrowserLauncher {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, ReservationError>;
}
