pub mod gcs;
pub mod local;

pub use gcs::GcsStore;
pub use local::LocalDirStore;

use crate::domain::booking::BookingRecord;
use crate::portal::DebugSnapshot;
use anyhow::Context;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Location prefix objects are written under, e.g. `gs://bucket`.
    fn uri_prefix(&self) -> String;

    /// Fails when the destination cannot accept writes (missing bucket, ...).
    async fn ensure_ready(&self) -> anyhow::Result<()>;

    /// Writes one object and returns its full location.
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
}

pub fn calendar_object_name(now: DateTime<Utc>) -> String {
    format!("otelms_calendar_{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// Uploads the scraped records as a pretty-printed JSON array and returns the object name.
pub async fn save_calendar(
    store: &dyn ObjectStore,
    records: &[BookingRecord],
    now: DateTime<Utc>,
) -> anyhow::Result<String> {
    tracing::info!(records = records.len(), "saving calendar to object store");
    store.ensure_ready().await?;

    let name = calendar_object_name(now);
    let body = serde_json::to_vec_pretty(records).context("failed to serialize booking records")?;
    let uri = store
        .put(&name, body, "application/json")
        .await
        .with_context(|| format!("failed to upload {name}"))?;

    tracing::info!(%uri, "calendar saved");
    Ok(name)
}

/// Stores a screenshot/HTML pair under `debug/`. Never fails the caller.
pub async fn save_debug_artifacts(
    store: &dyn ObjectStore,
    snapshot: &DebugSnapshot,
    name: &str,
    now: DateTime<Utc>,
) -> Option<String> {
    let base = format!("debug/{name}_{}", now.timestamp());

    if let Some(png) = &snapshot.screenshot_png {
        if let Err(err) = store.put(&format!("{base}.png"), png.clone(), "image/png").await {
            tracing::error!(error = %err, artifact = %base, "failed to save debug screenshot");
        }
    }

    match store
        .put(&format!("{base}.html"), snapshot.html.as_bytes().to_vec(), "text/html")
        .await
    {
        Ok(_) => {
            let location = format!("{}/{base}", store.uri_prefix());
            tracing::info!(%location, "debug artifacts saved");
            Some(location)
        }
        Err(err) => {
            tracing::error!(error = %err, artifact = %base, "failed to save debug artifacts");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn calendar_object_name_is_keyed_by_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 9, 5, 3).unwrap();
        assert_eq!(calendar_object_name(now), "otelms_calendar_20260127_090503.json");
    }

    #[tokio::test]
    async fn debug_artifacts_land_under_debug_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 9, 0, 0).unwrap();
        let snapshot = DebugSnapshot {
            screenshot_png: Some(vec![0x89, b'P', b'N', b'G']),
            html: "<html></html>".to_string(),
        };

        let location = save_debug_artifacts(&store, &snapshot, "login_error", now)
            .await
            .unwrap();

        let base = format!("login_error_{}", now.timestamp());
        assert!(location.ends_with(&format!("debug/{base}")));
        assert!(dir.path().join(format!("debug/{base}.png")).exists());
        let html = std::fs::read_to_string(dir.path().join(format!("debug/{base}.html"))).unwrap();
        assert_eq!(html, "<html></html>");
    }

    #[tokio::test]
    async fn saved_calendar_keeps_non_ascii_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2026, 1, 27, 9, 0, 0).unwrap();
        let records = vec![BookingRecord {
            resid: "1".to_string(),
            booking_id: "7296".to_string(),
            guest: "ჯაბა პაშკოვსკი".to_string(),
            source: "პირდაპირი გაყიდვა".to_string(),
            balance: "0".to_string(),
            status: String::new(),
            element_id: String::new(),
            extracted_at: "2026-01-27T09:00:00.000000Z".to_string(),
        }];

        let name = save_calendar(&store, &records, now).await.unwrap();
        let text = std::fs::read_to_string(dir.path().join(&name)).unwrap();
        assert!(text.contains("ჯაბა პაშკოვსკი"));

        let parsed: Vec<BookingRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, records);
    }
}
