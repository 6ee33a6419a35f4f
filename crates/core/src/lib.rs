pub mod domain;
pub mod extract;
pub mod pipeline;
pub mod portal;
pub mod storage;
pub mod sync;

pub const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    pub const DEFAULT_LOGIN_URL: &str = "https://116758.otelms.com/login_c2/";
    pub const DEFAULT_CALENDAR_URL: &str = "https://116758.otelms.com/reservation_c2/calendar/";
    pub const DEFAULT_ROWS_TABLE_ID: &str = "Table1";

    const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 20;
    const DEFAULT_MAX_RETRIES: u32 = 3;
    const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub otelms_username: Option<String>,
        pub otelms_password: Option<String>,
        pub otelms_login_url: String,
        pub otelms_calendar_url: String,
        pub gcs_bucket: Option<String>,
        pub gcs_access_token: Option<String>,
        pub gcs_base_url: Option<String>,
        pub rows_api_key: Option<String>,
        pub rows_spreadsheet_id: Option<String>,
        pub rows_table_id: String,
        pub rows_base_url: Option<String>,
        pub chrome_path: Option<String>,
        pub browser_ws_url: Option<String>,
        pub calendar_render_timeout: Duration,
        pub max_retries: u32,
        pub retry_delay: Duration,
        pub debug_on_success: bool,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Builds settings from any key lookup; blank values count as unset.
        pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let var = |key: &str| non_empty(lookup(key));

            let render_timeout_secs = parse_var("CALENDAR_RENDER_TIMEOUT", &var)?
                .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
            let max_retries = parse_var("SCRAPE_MAX_RETRIES", &var)?.unwrap_or(DEFAULT_MAX_RETRIES);
            anyhow::ensure!(max_retries >= 1, "SCRAPE_MAX_RETRIES must be >= 1");
            let retry_delay_secs =
                parse_var("SCRAPE_RETRY_DELAY_SECS", &var)?.unwrap_or(DEFAULT_RETRY_DELAY_SECS);

            Ok(Self {
                otelms_username: var("OTELMS_USERNAME"),
                otelms_password: var("OTELMS_PASSWORD"),
                otelms_login_url: var("OTELMS_LOGIN_URL")
                    .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
                otelms_calendar_url: var("OTELMS_CALENDAR_URL")
                    .unwrap_or_else(|| DEFAULT_CALENDAR_URL.to_string()),
                gcs_bucket: var("GCS_BUCKET"),
                gcs_access_token: var("GCS_ACCESS_TOKEN"),
                gcs_base_url: var("GCS_BASE_URL"),
                rows_api_key: var("ROWS_API_KEY"),
                rows_spreadsheet_id: var("ROWS_SPREADSHEET_ID"),
                rows_table_id: var("ROWS_TABLE_ID")
                    .unwrap_or_else(|| DEFAULT_ROWS_TABLE_ID.to_string()),
                rows_base_url: var("ROWS_BASE_URL"),
                chrome_path: var("CHROME_PATH"),
                browser_ws_url: var("BROWSER"),
                calendar_render_timeout: Duration::from_secs(render_timeout_secs),
                max_retries,
                retry_delay: Duration::from_secs(retry_delay_secs),
                debug_on_success: var("DEBUG_ON_SUCCESS")
                    .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
                sentry_dsn: var("SENTRY_DSN"),
            })
        }

        pub fn require_username(&self) -> anyhow::Result<&str> {
            self.otelms_username
                .as_deref()
                .context("OTELMS_USERNAME is required")
        }

        pub fn require_password(&self) -> anyhow::Result<&str> {
            self.otelms_password
                .as_deref()
                .context("OTELMS_PASSWORD is required")
        }

        pub fn require_gcs_bucket(&self) -> anyhow::Result<&str> {
            self.gcs_bucket.as_deref().context("GCS_BUCKET is required")
        }

        /// Fails on the first missing variable needed for a full scrape run.
        pub fn validate_for_scrape(&self) -> anyhow::Result<()> {
            self.require_username()?;
            self.require_password()?;
            self.require_gcs_bucket()?;
            Ok(())
        }
    }

    fn non_empty(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_var<T>(
        key: &str,
        var: &impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        var(key)
            .map(|v| v.parse::<T>().with_context(|| format!("{key} is invalid: {v}")))
            .transpose()
    }

}
