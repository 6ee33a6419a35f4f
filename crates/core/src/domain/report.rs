use super::utc_stamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Warning,
    Error,
}

/// Body returned by a scrape trigger, and printed by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub status: RunStatus,
    pub message: String,
    pub run_id: Uuid,
    #[serde(default)]
    pub data_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_synced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_artifact: Option<String>,
    pub elapsed_seconds: f64,
    pub timestamp: String,
}

impl ScrapeReport {
    pub fn success(
        run_id: Uuid,
        data_points: usize,
        gcs_file: String,
        rows_synced: bool,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: RunStatus::Success,
            message: format!("Extracted {data_points} booking records"),
            run_id,
            data_points,
            gcs_file: Some(gcs_file),
            rows_synced: Some(rows_synced),
            debug_artifact: None,
            elapsed_seconds: round_secs(elapsed),
            timestamp: utc_stamp(now),
        }
    }

    pub fn empty(run_id: Uuid, elapsed: Duration, now: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Warning,
            message: "No data extracted (calendar may be empty)".to_string(),
            run_id,
            data_points: 0,
            gcs_file: None,
            rows_synced: None,
            debug_artifact: None,
            elapsed_seconds: round_secs(elapsed),
            timestamp: utc_stamp(now),
        }
    }

    pub fn error(
        run_id: Uuid,
        message: String,
        debug_artifact: Option<String>,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: RunStatus::Error,
            message,
            run_id,
            data_points: 0,
            gcs_file: None,
            rows_synced: None,
            debug_artifact,
            elapsed_seconds: round_secs(elapsed),
            timestamp: utc_stamp(now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

impl HealthReport {
    pub fn healthy(version: &str, now: DateTime<Utc>) -> Self {
        Self {
            status: "healthy".to_string(),
            version: version.to_string(),
            timestamp: utc_stamp(now),
        }
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
