use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStage {
    Login,
    Calendar,
    Upload,
}

impl ScrapeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeStage::Login => "login",
            ScrapeStage::Calendar => "calendar",
            ScrapeStage::Upload => "upload",
        }
    }

    /// Debug artifact name used when the stage fails for an unclassified reason.
    pub fn default_artifact(self) -> &'static str {
        match self {
            ScrapeStage::Login => "login_error",
            ScrapeStage::Calendar => "calendar_error",
            ScrapeStage::Upload => "upload_error",
        }
    }
}

/// Browser-side failures operators need to tell apart from the stored artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalFailure {
    LoginNoButton,
    LoginFailed,
    CalendarTimeout,
}

impl PortalFailure {
    pub fn artifact_name(self) -> &'static str {
        match self {
            PortalFailure::LoginNoButton => "login_no_button",
            PortalFailure::LoginFailed => "login_failed",
            PortalFailure::CalendarTimeout => "calendar_timeout",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortalError {
    pub failure: PortalFailure,
    pub detail: String,
}

impl PortalError {
    pub fn new(failure: PortalFailure, detail: impl Into<String>) -> Self {
        Self {
            failure,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

impl std::error::Error for PortalError {}

/// Artifact name for a failed stage: the classified portal failure when the
/// error chain carries one, otherwise the stage default.
pub fn artifact_name_for(stage: ScrapeStage, err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PortalError>())
        .map(|portal| portal.failure.artifact_name())
        .unwrap_or_else(|| stage.default_artifact())
}

#[derive(Debug, Clone)]
pub struct ScrapeStageError {
    pub stage: ScrapeStage,
    pub detail: String,
    /// Name the debug capture was stored under (`login_failed`, `calendar_timeout`, ...).
    pub artifact_name: Option<&'static str>,
    /// Location of the stored screenshot/HTML pair, when one was captured.
    pub debug_artifact: Option<String>,
}

impl fmt::Display for ScrapeStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage.as_str(), self.detail)
    }
}

impl std::error::Error for ScrapeStageError {}
