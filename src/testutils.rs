use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde_json::Value;

use crate::{
    browser::{BrowserLauncher, BrowserSession, Locator},
    configuration::{Configuration, Credentials, EmailSettings, Pacing},
    configuration_handler::{DEFAULT_LOGIN_URL, DEFAULT_RESERVATION_URL},
    error::ReservationError,
    locators::Intent,
    notification::{Notification, Notifier},
    types::TimeSlot,
};

pub const LOGGED_IN_URL: &str = "https://www.condomisoft.com/system/index.php";
pub const APOLOGY_URL: &str = "https://www.condomisoft.com/system/apology.php?mensaje=No%20se%20acepta%20reservaciones%20con%20m%C3%A1s%20de%207%20d%C3%ADas";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    pub id: usize,
    pub tag: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum Effect {
    Navigate(String),
    SetPageText(String),
    Show(String, Vec<MockElement>),
    Hide(String),
}

/// A scripted page model: what each XPath currently matches, and what clicks,
/// navigations and reloads change.
#[derive(Debug, Default)]
pub struct MockSite {
    pub url: String,
    pub page_text: String,
    pub elements: HashMap<String, Vec<MockElement>>,
    pub children: HashMap<usize, Vec<MockElement>>,
    pub on_click: HashMap<usize, Vec<Effect>>,
    pub on_goto: Vec<(String, Vec<Effect>)>,
    pub on_refresh: Vec<Effect>,
    pub visited: Vec<String>,
    pub clicked: Vec<usize>,
    pub typed: Vec<(usize, String)>,
    pub scripts: Vec<String>,
    pub refreshes: u64,
    pub screenshots: u64,
    next_id: usize,
}

impl MockSite {
    pub fn xpath(intent: &Intent<'_>, strategy: usize) -> String {
        intent.chain()[strategy].to_xpath()
    }

    pub fn element(&mut self, tag: &str, text: &str) -> MockElement {
        self.next_id += 1;
        MockElement {
            id: self.next_id,
            tag: tag.into(),
            text: text.into(),
        }
    }

    pub fn show(&mut self, intent: &Intent<'_>, elements: Vec<MockElement>) {
        self.show_with(intent, 0, elements);
    }

    pub fn show_with(&mut self, intent: &Intent<'_>, strategy: usize, elements: Vec<MockElement>) {
        self.elements
            .insert(Self::xpath(intent, strategy), elements);
    }

    pub fn on_click(&mut self, element: &MockElement, effects: Vec<Effect>) {
        self.on_click.insert(element.id, effects);
    }

    pub fn on_goto(&mut self, url_prefix: &str, effects: Vec<Effect>) {
        self.on_goto.push((url_prefix.into(), effects));
    }

    /// A new page: nothing of the previous one stays visible.
    fn load(&mut self, url: String) {
        self.url = url;
        self.page_text.clear();
        self.elements.clear();
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Navigate(url) => self.load(url),
                Effect::SetPageText(text) => self.page_text = text,
                Effect::Show(xpath, elements) => {
                    self.elements.insert(xpath, elements);
                }
                Effect::Hide(xpath) => {
                    self.elements.remove(&xpath);
                }
            }
        }
    }

    pub fn was_clicked(&self, element: &MockElement) -> bool {
        self.clicked.contains(&element.id)
    }

    pub fn visits_to(&self, url_prefix: &str) -> usize {
        self.visited
            .iter()
            .filter(|url| url.starts_with(url_prefix))
            .count()
    }
}

pub fn show(intent: &Intent<'_>, elements: Vec<MockElement>) -> Effect {
    Effect::Show(MockSite::xpath(intent, 0), elements)
}

pub fn hide(intent: &Intent<'_>) -> Effect {
    Effect::Hide(MockSite::xpath(intent, 0))
}

pub struct MockBrowserSessionInner {
    pub site: Mutex<MockSite>,
    pub closed: AtomicBool,
    pub fail_refresh: AtomicBool,
}

#[derive(Clone)]
pub struct MockBrowserSession(pub Arc<MockBrowserSessionInner>);

impl MockBrowserSession {
    pub fn new(site: MockSite) -> Self {
        Self(Arc::new(MockBrowserSessionInner {
            site: Mutex::new(site),
            closed: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
        }))
    }

    pub fn site(&self) -> std::sync::MutexGuard<'_, MockSite> {
        self.0.site.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

impl BrowserSession for MockBrowserSession {
    type Element = MockElement;

    async fn goto(&self, url: &str) -> Result<(), ReservationError> {
        let mut site = self.site();
        site.load(url.into());
        site.visited.push(url.into());
        let effects: Vec<Effect> = site
            .on_goto
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .flat_map(|(_, effects)| effects.clone())
            .collect();
        site.apply(effects);
        Ok(())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<MockElement>, ReservationError> {
        Ok(self
            .site()
            .elements
            .get(&locator.to_xpath())
            .cloned()
            .unwrap_or_default())
    }

    async fn find_all_in(
        &self,
        parent: &MockElement,
        _locator: &Locator,
    ) -> Result<Vec<MockElement>, ReservationError> {
        Ok(self
            .site()
            .children
            .get(&parent.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> Result<bool, ReservationError> {
        let site = self.site();
        Ok(site.elements.contains_key(&locator.to_xpath()) || !site.url.is_empty())
    }

    async fn click(&self, element: &MockElement) -> Result<(), ReservationError> {
        let mut site = self.site();
        site.clicked.push(element.id);
        let effects = site.on_click.get(&element.id).cloned().unwrap_or_default();
        site.apply(effects);
        Ok(())
    }

    async fn clear(&self, _element: &MockElement) -> Result<(), ReservationError> {
        Ok(())
    }

    async fn send_keys(&self, element: &MockElement, text: &str) -> Result<(), ReservationError> {
        self.site().typed.push((element.id, text.into()));
        Ok(())
    }

    async fn text(&self, element: &MockElement) -> Result<String, ReservationError> {
        Ok(element.text.clone())
    }

    async fn tag_name(&self, element: &MockElement) -> Result<String, ReservationError> {
        Ok(element.tag.clone())
    }

    async fn scroll_into_view(&self, _element: &MockElement) -> Result<(), ReservationError> {
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<Value, ReservationError> {
        self.site().scripts.push(script.into());
        Ok(Value::Null)
    }

    async fn current_url(&self) -> Result<String, ReservationError> {
        Ok(self.site().url.clone())
    }

    async fn page_text(&self) -> Result<String, ReservationError> {
        Ok(self.site().page_text.clone())
    }

    async fn refresh(&self) -> Result<(), ReservationError> {
        if self.0.fail_refresh.load(Ordering::SeqCst) {
            return Err(ReservationError::Driver("refresh timed out".into()));
        }
        let mut site = self.site();
        site.refreshes += 1;
        let effects = site.on_refresh.clone();
        site.apply(effects);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ReservationError> {
        self.site().screenshots += 1;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(self) -> Result<(), ReservationError> {
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockBrowserLauncher {
    pub session: MockBrowserSession,
    pub success: AtomicBool,
    pub calls_to_launch: AtomicU64,
}

impl MockBrowserLauncher {
    pub fn new(session: MockBrowserSession) -> Self {
        Self {
            session,
            success: AtomicBool::new(true),
            calls_to_launch: AtomicU64::default(),
        }
    }
}

impl BrowserLauncher for MockBrowserLauncher {
    type Session = MockBrowserSession;

    async fn launch(&self) -> Result<MockBrowserSession, ReservationError> {
        self.calls_to_launch.fetch_add(1, Ordering::SeqCst);
        match self.success.load(Ordering::SeqCst) {
            true => Ok(self.session.clone()),
            false => Err(ReservationError::Driver("Supposed to fail".into())),
        }
    }
}

pub struct MockNotifierInner {
    pub success: AtomicBool,
    pub sent: Mutex<Vec<Notification>>,
}

#[derive(Clone)]
pub struct MockNotifier(pub Arc<MockNotifierInner>);

impl MockNotifier {
    pub fn new() -> Self {
        Self(Arc::new(MockNotifierInner {
            success: AtomicBool::new(true),
            sent: Mutex::default(),
        }))
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.0.sent.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ReservationError> {
        self.0.sent.lock().unwrap().push(notification.clone());
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(ReservationError::Notification("Supposed to fail".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestConfiguration {
    pub username: Option<String>,
    pub password: Option<String>,
    pub apartment: String,
    pub time_slots: Vec<TimeSlot>,
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            username: Some("vecino@example.com".into()),
            password: Some("testpass123".into()),
            apartment: "G-502".into(),
            time_slots: test_slots(),
            screenshot_dir: None,
        }
    }
}

impl Configuration for TestConfiguration {
    fn credentials(&self) -> Result<Credentials, ReservationError> {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    fn login_url(&self) -> String {
        DEFAULT_LOGIN_URL.into()
    }

    fn reservation_url(&self) -> String {
        DEFAULT_RESERVATION_URL.into()
    }

    fn apartment(&self) -> String {
        self.apartment.clone()
    }

    fn time_slots(&self) -> Vec<TimeSlot> {
        self.time_slots.clone()
    }

    fn gym_days(&self) -> Vec<Weekday> {
        vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
    }

    fn timezone(&self) -> Tz {
        chrono_tz::America::Mexico_City
    }

    fn trigger_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(0, 1, 0).unwrap()
    }

    fn hold_buffer(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn pacing(&self) -> Pacing {
        Pacing::none()
    }

    fn element_timeout(&self) -> Duration {
        Duration::ZERO
    }

    fn screenshot_dir(&self) -> Option<PathBuf> {
        self.screenshot_dir.clone()
    }

    fn email(&self) -> EmailSettings {
        EmailSettings::default()
    }
}

pub fn test_slots() -> Vec<TimeSlot> {
    vec![
        "07:30-08:00".parse().unwrap(),
        "08:00-08:30".parse().unwrap(),
    ]
}

/// Effects of landing on the "more than 7 days" page, which offers `back`.
pub fn apology_page(back: &MockElement) -> Vec<Effect> {
    vec![
        Effect::Navigate(APOLOGY_URL.into()),
        Effect::SetPageText(
            "No se acepta reservaciones con más de 7 días de anticipación".into(),
        ),
        show(&Intent::ReturnButton, vec![back.clone()]),
    ]
}

/// How the reservation table answers a slot in [`condomisoft_site`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBehaviour {
    /// Reserving works and the row then reads "Confirmado para <apartment>".
    Books,
    /// The row reads "Reservado" and has no action.
    Occupied,
    /// Clicking the slot lands on the 7-days rejection page.
    TooFarAhead,
    /// The slot opens its confirmation, but confirming lands on the 7-days
    /// rejection page.
    RejectedOnConfirm,
}

/// A Condomisoft site where login succeeds, the apartment exists, and the
/// calendar offers `days`. Each slot behaves as given.
pub fn condomisoft_site(
    apartment: &str,
    days: &[&str],
    slots: &[(TimeSlot, SlotBehaviour)],
) -> MockBrowserSession {
    let mut site = MockSite::default();

    let username = site.element("input", "");
    let password = site.element("input", "");
    let submit = site.element("input", "Entrar");
    let logout = site.element("a", "Salir");
    let unit = site.element("button", apartment);
    site.on_goto(
        DEFAULT_LOGIN_URL,
        vec![
            show(&Intent::UsernameField, vec![username]),
            show(&Intent::PasswordField, vec![password]),
            show(&Intent::SubmitLogin, vec![submit.clone()]),
        ],
    );
    site.on_click(
        &submit,
        vec![
            Effect::Navigate(LOGGED_IN_URL.into()),
            show(&Intent::LoggedInMarker, vec![logout]),
            show(&Intent::Apartment(apartment), vec![unit]),
        ],
    );

    let cells: Vec<MockElement> = days.iter().map(|day| site.element("td", day)).collect();
    let back = site.element("a", "Regresar");
    let rejection = apology_page(&back);
    let mut reservation_page = vec![
        show(&Intent::AvailableDays, cells),
        Effect::SetPageText("GIMNASIO CUARTO PILATES".into()),
    ];

    for (slot, behaviour) in slots {
        match behaviour {
            SlotBehaviour::Books => {
                let action = site.element("button", "Disponible");
                let confirm = site.element("button", "Confirmar");
                let confirmed = site.element("td", &format!("Confirmado para {apartment}"));
                site.on_click(&action, vec![show(&Intent::ConfirmButton, vec![confirm.clone()])]);
                site.on_click(
                    &confirm,
                    vec![
                        hide(&Intent::ConfirmButton),
                        hide(&Intent::SlotAction(slot)),
                        show(
                            &Intent::SlotConfirmed {
                                slot,
                                apartment,
                            },
                            vec![confirmed],
                        ),
                    ],
                );
                reservation_page.push(show(&Intent::SlotAction(slot), vec![action]));
            }
            SlotBehaviour::Occupied => {
                let row = site.element("tr", &format!("{slot} Reservado"));
                reservation_page.push(show(&Intent::SlotRow(slot), vec![row]));
            }
            SlotBehaviour::TooFarAhead => {
                let action = site.element("button", "Disponible");
                site.on_click(&action, rejection.clone());
                reservation_page.push(show(&Intent::SlotAction(slot), vec![action]));
            }
            SlotBehaviour::RejectedOnConfirm => {
                let action = site.element("button", "Disponible");
                let confirm = site.element("button", "Confirmar");
                site.on_click(&action, vec![show(&Intent::ConfirmButton, vec![confirm.clone()])]);
                site.on_click(&confirm, rejection.clone());
                reservation_page.push(show(&Intent::SlotAction(slot), vec![action]));
            }
        }
    }
    site.on_goto(DEFAULT_RESERVATION_URL, reservation_page);

    MockBrowserSession::new(site)
}
