use crate::config::Settings;
use crate::domain::booking::BookingRecord;
use crate::sync::SheetSync;
use anyhow::{Context, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.rows.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct RowsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    spreadsheet_id: String,
    table_id: String,
}

#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    values: Vec<[&'a str; 7]>,
}

enum Attempt {
    Done(bool),
    RetryAfter(Duration),
}

impl RowsClient {
    /// `None` when the API key or spreadsheet id is not configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let (Some(api_key), Some(spreadsheet_id)) = (
            settings.rows_api_key.clone(),
            settings.rows_spreadsheet_id.clone(),
        ) else {
            tracing::info!("Rows.com credentials not configured, skipping sync");
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build Rows.com http client")?;

        Ok(Some(Self {
            http,
            base_url: settings
                .rows_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            spreadsheet_id,
            table_id: settings.rows_table_id.clone(),
        }))
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/spreadsheets/{}/tables/{}/values:append",
            self.base_url.trim_end_matches('/'),
            self.spreadsheet_id,
            self.table_id
        )
    }

    async fn append_once(&self, body: &AppendRequest<'_>) -> Result<Attempt> {
        let res = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("Rows.com request failed")?;

        let status = res.status();
        if status.is_success() {
            return Ok(Attempt::Done(true));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::RetryAfter(retry_after(res.headers().get(RETRY_AFTER))));
        }

        let text = res.text().await.unwrap_or_default();
        tracing::error!(%status, body = %text, "Rows.com sync failed");
        Ok(Attempt::Done(false))
    }
}

#[async_trait::async_trait]
impl SheetSync for RowsClient {
    async fn append(&self, records: &[BookingRecord]) -> bool {
        let body = AppendRequest {
            values: records.iter().map(BookingRecord::to_row).collect(),
        };
        tracing::info!(rows = body.values.len(), "syncing records to Rows.com");

        for attempt in 1..=MAX_ATTEMPTS {
            match self.append_once(&body).await {
                Ok(Attempt::Done(ok)) => {
                    if ok {
                        tracing::info!(rows = body.values.len(), "Rows.com sync complete");
                    }
                    return ok;
                }
                Ok(Attempt::RetryAfter(wait)) => {
                    if attempt == MAX_ATTEMPTS {
                        break;
                    }
                    tracing::warn!(attempt, ?wait, "Rows.com rate limited; retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "Rows.com sync error");
                    return false;
                }
            }
        }
        false
    }
}

fn retry_after(header: Option<&reqwest::header::HeaderValue>) -> Duration {
    let secs = header
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}
