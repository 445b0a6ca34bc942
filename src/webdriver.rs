use clap::ValueEnum;
use fantoccini::{
    elements::Element,
    error::CmdError,
    wd::{Capabilities, TimeoutConfiguration},
    Client, ClientBuilder, Locator as WdLocator,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    browser::{BrowserLauncher, BrowserSession, Locator},
    error::ReservationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrowserKind {
    /// Chrome first, Firefox if Chrome cannot be started.
    Auto,
    Chrome,
    Firefox,
}

#[derive(Debug, Clone)]
pub struct WebDriverSettings {
    pub browser: BrowserKind,
    pub chrome_url: String,
    pub firefox_url: String,
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub implicit_wait: Duration,
}

impl WebDriverSettings {
    fn candidates(&self) -> Vec<BrowserKind> {
        match self.browser {
            BrowserKind::Auto => vec![BrowserKind::Chrome, BrowserKind::Firefox],
            kind => vec![kind],
        }
    }

    fn capabilities(&self, kind: BrowserKind) -> Capabilities {
        let capabilities = match kind {
            BrowserKind::Firefox => {
                let mut args = vec!["--width=1920", "--height=1080"];
                if self.headless {
                    args.push("-headless");
                }
                json!({
                    "browserName": "firefox",
                    "moz:firefoxOptions": {
                        "args": args,
                        "prefs": {
                            "dom.webdriver.enabled": false,
                            "useAutomationExtension": false,
                        },
                    },
                })
            }
            _ => {
                let mut args = vec![
                    "--no-sandbox",
                    "--disable-dev-shm-usage",
                    "--disable-gpu",
                    "--disable-extensions",
                    "--window-size=1920,1080",
                    "--disable-blink-features=AutomationControlled",
                ];
                if self.headless {
                    args.push("--headless");
                }
                json!({
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false,
                    },
                })
            }
        };
        match capabilities {
            Value::Object(map) => map,
            _ => Capabilities::new(),
        }
    }

    fn endpoint(&self, kind: BrowserKind) -> &str {
        match kind {
            BrowserKind::Firefox => &self.firefox_url,
            _ => &self.chrome_url,
        }
    }
}

pub struct WebDriverLauncher {
    settings: WebDriverSettings,
}

impl WebDriverLauncher {
    pub fn new(settings: WebDriverSettings) -> Self {
        Self { settings }
    }

    async fn connect(&self, kind: BrowserKind) -> Result<Client, ReservationError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.settings.capabilities(kind));
        let client = builder.connect(self.settings.endpoint(kind)).await?;

        let timeouts = TimeoutConfiguration::new(
            None,
            Some(self.settings.page_load_timeout),
            Some(self.settings.implicit_wait),
        );
        if let Err(err) = client.update_timeouts(timeouts).await {
            let _ = client.close().await;
            return Err(err.into());
        }
        Ok(client)
    }
}

impl BrowserLauncher for WebDriverLauncher {
    type Session = WebDriverSession;

    async fn launch(&self) -> Result<WebDriverSession, ReservationError> {
        info!("Initializing WebDriver...");
        let mut last_error = None;
        for kind in self.settings.candidates() {
            match self.connect(kind).await {
                Ok(client) => {
                    info!(browser = ?kind, endpoint = self.settings.endpoint(kind), "WebDriver initialized");
                    return Ok(WebDriverSession { client });
                }
                Err(err) => {
                    warn!(browser = ?kind, ?err, "Could not start browser");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ReservationError::Driver("no browser configured".into())))
    }
}

pub struct WebDriverSession {
    client: Client,
}

impl BrowserSession for WebDriverSession {
    type Element = Element;

    async fn goto(&self, url: &str) -> Result<(), ReservationError> {
        Ok(self.client.goto(url).await?)
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Element>, ReservationError> {
        let xpath = locator.to_xpath();
        Ok(self.client.find_all(WdLocator::XPath(&xpath)).await?)
    }

    async fn find_all_in(
        &self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<Element>, ReservationError> {
        let xpath = locator.to_xpath();
        Ok(parent.find_all(WdLocator::XPath(&xpath)).await?)
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool, ReservationError> {
        let xpath = locator.to_xpath();
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(WdLocator::XPath(&xpath))
            .await
        {
            Ok(_) => Ok(true),
            Err(CmdError::WaitTimeout) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn click(&self, element: &Element) -> Result<(), ReservationError> {
        Ok(element.click().await?)
    }

    async fn clear(&self, element: &Element) -> Result<(), ReservationError> {
        Ok(element.clear().await?)
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<(), ReservationError> {
        Ok(element.send_keys(text).await?)
    }

    async fn text(&self, element: &Element) -> Result<String, ReservationError> {
        Ok(element.text().await?)
    }

    async fn tag_name(&self, element: &Element) -> Result<String, ReservationError> {
        Ok(element.tag_name().await?)
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), ReservationError> {
        let argument = serde_json::to_value(element)
            .map_err(|err| ReservationError::Driver(format!("serialize element: {err}")))?;
        self.client
            .execute("arguments[0].scrollIntoView(true);", vec![argument])
            .await?;
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<Value, ReservationError> {
        Ok(self.client.execute(script, Vec::new()).await?)
    }

    async fn current_url(&self) -> Result<String, ReservationError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn page_text(&self) -> Result<String, ReservationError> {
        let text = self
            .client
            .execute("return document.body ? document.body.innerText : '';", Vec::new())
            .await?;
        Ok(text.as_str().unwrap_or_default().to_string())
    }

    async fn refresh(&self) -> Result<(), ReservationError> {
        Ok(self.client.refresh().await?)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ReservationError> {
        Ok(self.client.screenshot().await?)
    }

    async fn close(self) -> Result<(), ReservationError> {
        Ok(self.client.close().await?)
    }
}
