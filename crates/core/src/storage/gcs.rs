use crate::config::Settings;
use crate::storage::ObjectStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// Refresh a little before the metadata server's expiry.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Google Cloud Storage over the JSON API.
///
/// Credentials come from `GCS_ACCESS_TOKEN` when set, otherwise from the
/// instance metadata server (the default service account on Cloud Run).
#[derive(Debug)]
pub struct GcsStore {
    http: reqwest::Client,
    bucket: String,
    base_url: String,
    static_token: Option<String>,
    token_cache: tokio::sync::Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: i64,
}

impl GcsStore {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let bucket = settings.require_gcs_bucket()?.to_string();
        let base_url = settings
            .gcs_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build GCS http client")?;

        Ok(Self {
            http,
            bucket,
            base_url,
            static_token: settings.gcs_access_token.clone(),
            token_cache: tokio::sync::Mutex::new(None),
        })
    }

    fn bucket_url(&self) -> String {
        format!(
            "{}/storage/v1/b/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url.trim_end_matches('/'),
            self.bucket
        )
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let mut guard = self.token_cache.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let res = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("metadata token request failed")?;
        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read metadata token response")?;
        if !status.is_success() {
            anyhow::bail!("metadata token HTTP {status}: {text}");
        }

        let token = serde_json::from_str::<MetadataToken>(&text)
            .context("failed to parse metadata token response")?;
        let expires_at =
            Utc::now() + ChronoDuration::seconds(token.expires_in - TOKEN_EXPIRY_MARGIN_SECS);
        *guard = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsStore {
    fn uri_prefix(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    async fn ensure_ready(&self) -> Result<()> {
        let token = self.access_token().await?;
        let res = self
            .http
            .get(self.bucket_url())
            .bearer_auth(token)
            .send()
            .await
            .context("GCS bucket lookup failed")?;

        match res.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => anyhow::bail!("GCS bucket '{}' does not exist", self.bucket),
            status => {
                let text = res.text().await.unwrap_or_default();
                anyhow::bail!("GCS bucket lookup HTTP {status}: {text}")
            }
        }
    }

    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let token = self.access_token().await?;
        let res = self
            .http
            .post(self.upload_url())
            .bearer_auth(token)
            .query(&[("uploadType", "media"), ("name", name)])
            .header(CONTENT_TYPE, HeaderValue::from_str(content_type)?)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("GCS upload of {name} failed"))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("GCS upload HTTP {status}: {text}");
        }

        Ok(format!("gs://{}/{name}", self.bucket))
    }
}
