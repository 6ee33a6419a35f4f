use crate::config::Settings;
use crate::portal::{CalendarPortal, DebugSnapshot, PortalError, PortalFailure};
use anyhow::{bail, Context};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);
const READY_STATE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
// Calendar blocks keep re-rendering for a moment after readyState flips.
const CALENDAR_SETTLE: Duration = Duration::from_secs(2);
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

const CALENDAR_ITEM_SELECTOR: &str = "div.calendar_item";

#[derive(Debug, Clone, Copy)]
enum Locator {
    Css(&'static str),
    XPath(&'static str),
}

const SUBMIT_BUTTONS: &[Locator] = &[
    Locator::XPath("//button[contains(text(), 'შესვლა')]"),
    Locator::XPath("//button[contains(text(), 'Login')]"),
    Locator::Css("button[type='submit']"),
    Locator::XPath("//form//button"),
    Locator::Css("input[type='submit']"),
];

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub username: String,
    pub password: String,
    pub login_url: String,
    pub calendar_url: String,
    pub render_timeout: Duration,
    pub chrome_path: Option<PathBuf>,
    /// Websocket URL of an already running browser; skips launching one.
    pub browser_ws_url: Option<String>,
}

impl PortalConfig {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            username: settings.require_username()?.to_string(),
            password: settings.require_password()?.to_string(),
            login_url: settings.otelms_login_url.clone(),
            calendar_url: settings.otelms_calendar_url.clone(),
            render_timeout: settings.calendar_render_timeout,
            chrome_path: settings.chrome_path.as_ref().map(PathBuf::from),
            browser_ws_url: settings.browser_ws_url.clone(),
        })
    }
}

/// Headless Chrome session. The browser process is closed when the last
/// handle is dropped.
#[derive(Clone)]
pub struct ChromePortal {
    session: Arc<ChromeSession>,
}

struct ChromeSession {
    // Held so the browser outlives the tab.
    _browser: Browser,
    tab: Arc<Tab>,
    config: PortalConfig,
}

impl ChromePortal {
    pub async fn open(config: PortalConfig) -> anyhow::Result<Self> {
        let session = run_blocking(move || ChromeSession::open(config)).await?;
        Ok(Self {
            session: Arc::new(session),
        })
    }
}

#[async_trait::async_trait]
impl CalendarPortal for ChromePortal {
    async fn login(&self) -> anyhow::Result<()> {
        let session = self.session.clone();
        run_blocking(move || session.login()).await
    }

    async fn calendar_html(&self) -> anyhow::Result<String> {
        let session = self.session.clone();
        run_blocking(move || session.calendar_html()).await
    }

    async fn debug_snapshot(&self) -> anyhow::Result<DebugSnapshot> {
        let session = self.session.clone();
        run_blocking(move || session.debug_snapshot()).await
    }
}

async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("browser task panicked")?
}

impl ChromeSession {
    fn open(config: PortalConfig) -> anyhow::Result<Self> {
        let browser = match config.browser_ws_url.as_deref() {
            Some(ws_url) => {
                tracing::info!(%ws_url, "connecting to running browser");
                Browser::connect(ws_url.to_string()).context("failed to connect to browser")?
            }
            None => {
                let user_agent = format!("--user-agent={USER_AGENT}");
                let args: Vec<&OsStr> = vec![
                    OsStr::new("--disable-dev-shm-usage"),
                    OsStr::new("--disable-gpu"),
                    OsStr::new("--disable-blink-features=AutomationControlled"),
                    OsStr::new(&user_agent),
                ];
                let options = LaunchOptions::default_builder()
                    .headless(true)
                    .sandbox(false)
                    .window_size(Some((1920, 1080)))
                    .path(config.chrome_path.clone())
                    .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
                    .args(args)
                    .build()
                    .map_err(|e| anyhow::anyhow!("invalid chrome launch options: {e}"))?;
                Browser::new(options).context("failed to launch chrome")?
            }
        };

        let tab = browser.new_tab().context("failed to open browser tab")?;
        tab.set_user_agent(USER_AGENT, None, None)
            .context("failed to set user agent")?;
        tab.enable_stealth_mode()
            .context("failed to enable stealth mode")?;
        tracing::info!("chrome session initialized");

        Ok(Self {
            _browser: browser,
            tab,
            config,
        })
    }

    fn login(&self) -> anyhow::Result<()> {
        let login_url = self.config.login_url.as_str();
        tracing::info!(url = login_url, "navigating to login page");
        self.tab
            .navigate_to(login_url)
            .with_context(|| format!("failed to open {login_url}"))?;

        let username = self
            .tab
            .wait_for_element_with_custom_timeout("#userLogin", LOGIN_TIMEOUT)
            .context("login form did not render (#userLogin)")?;
        let password = self
            .tab
            .wait_for_element_with_custom_timeout("#password", LOGIN_TIMEOUT)
            .context("login form did not render (#password)")?;

        fill_input(&username, &self.config.username)?;
        fill_input(&password, &self.config.password)?;
        tracing::info!("credentials entered, submitting login form");

        match self.tab.press_key("Enter") {
            Ok(_) => tracing::info!("submitted via Enter key"),
            Err(err) => {
                tracing::warn!(error = %err, "Enter key submit failed; trying submit buttons");
                self.click_submit_button()?;
            }
        }

        self.wait_until_url_leaves(login_url, LOGIN_TIMEOUT)?;
        self.wait_for_ready_state(READY_STATE_TIMEOUT)?;
        tracing::info!(url = %self.tab.get_url(), "login successful");
        Ok(())
    }

    fn click_submit_button(&self) -> anyhow::Result<()> {
        for locator in SUBMIT_BUTTONS {
            let found = match locator {
                Locator::Css(selector) => self.tab.find_element(selector),
                Locator::XPath(xpath) => self.tab.find_element_by_xpath(xpath),
            };
            if let Ok(button) = found {
                button.click().context("failed to click submit button")?;
                tracing::info!(?locator, "submitted via button");
                return Ok(());
            }
        }
        Err(PortalError::new(
            PortalFailure::LoginNoButton,
            "could not find a login submit button",
        )
        .into())
    }

    fn wait_until_url_leaves(&self, url: &str, timeout: Duration) -> anyhow::Result<()> {
        let started = Instant::now();
        loop {
            if self.tab.get_url() != url {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(PortalError::new(
                    PortalFailure::LoginFailed,
                    format!("login failed - no redirect from {url} within {timeout:?}"),
                )
                .into());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn wait_for_ready_state(&self, timeout: Duration) -> anyhow::Result<()> {
        let started = Instant::now();
        loop {
            let state = self
                .tab
                .evaluate("document.readyState", false)
                .context("failed to read document.readyState")?
                .value;
            if state.as_ref().and_then(|v| v.as_str()) == Some("complete") {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                bail!("page did not finish loading within {timeout:?} (readyState={state:?})");
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn calendar_html(&self) -> anyhow::Result<String> {
        let calendar_url = self.config.calendar_url.as_str();
        tracing::info!(url = calendar_url, "loading calendar page");
        self.tab
            .navigate_to(calendar_url)
            .with_context(|| format!("failed to open {calendar_url}"))?;

        self.tab
            .wait_for_element_with_custom_timeout(CALENDAR_ITEM_SELECTOR, self.config.render_timeout)
            .map_err(|err| {
                PortalError::new(
                    PortalFailure::CalendarTimeout,
                    format!(
                        "calendar page timeout - booking blocks not found within {:?}: {err}",
                        self.config.render_timeout
                    ),
                )
            })?;
        tracing::info!("calendar rendered");

        self.wait_for_ready_state(READY_STATE_TIMEOUT)?;
        std::thread::sleep(CALENDAR_SETTLE);

        self.tab.get_content().context("failed to read calendar HTML")
    }

    fn debug_snapshot(&self) -> anyhow::Result<DebugSnapshot> {
        let screenshot_png = match self.tab.capture_screenshot(
            CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        ) {
            Ok(png) => Some(png),
            Err(err) => {
                tracing::warn!(error = %err, "screenshot capture failed");
                None
            }
        };
        let html = self.tab.get_content().context("failed to read page HTML")?;
        Ok(DebugSnapshot {
            screenshot_png,
            html,
        })
    }
}

fn fill_input(element: &Element<'_>, value: &str) -> anyhow::Result<()> {
    element
        .call_js_fn("function() { this.value = ''; }", vec![], false)
        .context("failed to clear input")?;
    element.focus()?.type_into(value)?;
    Ok(())
}
