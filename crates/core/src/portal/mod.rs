pub mod chrome;
pub mod error;

pub use chrome::{ChromePortal, PortalConfig};
pub use error::{artifact_name_for, PortalError, PortalFailure, ScrapeStage, ScrapeStageError};

/// Page state captured when a stage fails, for offline troubleshooting.
#[derive(Debug, Clone)]
pub struct DebugSnapshot {
    pub screenshot_png: Option<Vec<u8>>,
    pub html: String,
}

/// A logged-in view onto the reservation calendar.
#[async_trait::async_trait]
pub trait CalendarPortal: Send + Sync {
    async fn login(&self) -> anyhow::Result<()>;

    /// Loads the calendar, waits for booking blocks to render and returns the page HTML.
    async fn calendar_html(&self) -> anyhow::Result<String>;

    async fn debug_snapshot(&self) -> anyhow::Result<DebugSnapshot>;
}
