use crate::config::Settings;
use crate::domain::booking::BookingRecord;
use crate::domain::report::ScrapeReport;
use crate::extract::parse_calendar;
use crate::portal::{artifact_name_for, CalendarPortal, ScrapeStage, ScrapeStageError};
use crate::storage::{save_calendar, save_debug_artifacts, ObjectStore};
use crate::sync::SheetSync;
use chrono::Utc;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Store a `calendar_loaded` snapshot even when the run succeeds.
    pub debug_on_success: bool,
}

impl ScrapeOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_retries,
            retry_delay: settings.retry_delay,
            debug_on_success: settings.debug_on_success,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    /// The calendar rendered but held no bookings; nothing was uploaded.
    Empty,
    Saved {
        records: Vec<BookingRecord>,
        gcs_file: String,
        rows_synced: bool,
    },
}

impl ScrapeOutcome {
    pub fn records(&self) -> &[BookingRecord] {
        match self {
            ScrapeOutcome::Empty => &[],
            ScrapeOutcome::Saved { records, .. } => records,
        }
    }

    pub fn into_report(self, run_id: Uuid, elapsed: Duration) -> ScrapeReport {
        let now = Utc::now();
        match self {
            ScrapeOutcome::Empty => ScrapeReport::empty(run_id, elapsed, now),
            ScrapeOutcome::Saved {
                records,
                gcs_file,
                rows_synced,
            } => ScrapeReport::success(run_id, records.len(), gcs_file, rows_synced, elapsed, now),
        }
    }
}

/// Report for a failed run, carrying the debug artifact location when one was stored.
pub fn error_report(err: &anyhow::Error, run_id: Uuid, elapsed: Duration) -> ScrapeReport {
    let debug_artifact = err
        .downcast_ref::<ScrapeStageError>()
        .and_then(|diag| diag.debug_artifact.clone());
    ScrapeReport::error(run_id, format!("{err:#}"), debug_artifact, elapsed, Utc::now())
}

/// Runs `op` up to `max_attempts` times, sleeping `base_delay * attempt` between tries.
pub async fn retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) => {
                let backoff = base_delay * attempt;
                tracing::warn!(label, attempt, ?backoff, error = %format!("{err:#}"), "attempt failed; retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Log in, render the calendar, extract bookings, upload them and sync them.
pub async fn run_scrape(
    portal: &dyn CalendarPortal,
    store: &dyn ObjectStore,
    sync: Option<&dyn SheetSync>,
    options: &ScrapeOptions,
) -> anyhow::Result<ScrapeOutcome> {
    let attempts = options.max_attempts.max(1);

    if let Err(err) = retry("login", attempts, options.retry_delay, || portal.login()).await {
        return Err(stage_failure(portal, store, ScrapeStage::Login, err).await);
    }

    let extraction = retry("calendar", attempts, options.retry_delay, || async {
        let html = portal.calendar_html().await?;
        Ok::<_, anyhow::Error>(parse_calendar(&html, Utc::now()))
    })
    .await;
    let extraction = match extraction {
        Ok(extraction) => extraction,
        Err(err) => {
            return Err(stage_failure(portal, store, ScrapeStage::Calendar, err).await)
        }
    };

    if options.debug_on_success {
        match portal.debug_snapshot().await {
            Ok(snapshot) => {
                save_debug_artifacts(store, &snapshot, "calendar_loaded", Utc::now()).await;
            }
            Err(err) => tracing::warn!(error = %err, "failed to capture calendar snapshot"),
        }
    }

    let records = extraction.records;
    if records.is_empty() {
        tracing::warn!(matched = extraction.matched, "no booking records extracted");
        return Ok(ScrapeOutcome::Empty);
    }

    let gcs_file = save_calendar(store, &records, Utc::now())
        .await
        .map_err(|err| {
            anyhow::Error::new(ScrapeStageError {
                stage: ScrapeStage::Upload,
                detail: format!("{err:#}"),
                artifact_name: None,
                debug_artifact: None,
            })
        })?;

    let rows_synced = match sync {
        Some(sync) => sync.append(&records).await,
        None => false,
    };

    Ok(ScrapeOutcome::Saved {
        records,
        gcs_file,
        rows_synced,
    })
}

/// Result of one traced run: the response body, the extracted records and the
/// failure, if any.
#[derive(Debug)]
pub struct ScrapeRun {
    pub report: ScrapeReport,
    pub records: Vec<BookingRecord>,
    pub error: Option<anyhow::Error>,
}

impl ScrapeRun {
    pub fn into_parts(self) -> (ScrapeReport, Option<anyhow::Error>) {
        (self.report, self.error)
    }
}

/// Convenience wrapper producing the response body for any run result.
pub async fn run_and_report(
    portal: &dyn CalendarPortal,
    store: &dyn ObjectStore,
    sync: Option<&dyn SheetSync>,
    options: &ScrapeOptions,
) -> ScrapeRun {
    let run_id = Uuid::new_v4();
    let started = Instant::now();

    let result = run_scrape(portal, store, sync, options)
        .instrument(tracing::info_span!("scrape", %run_id))
        .await;

    match result {
        Ok(outcome) => {
            let records = outcome.records().to_vec();
            let report = outcome.into_report(run_id, started.elapsed());
            tracing::info!(
                %run_id,
                data_points = report.data_points,
                elapsed_seconds = report.elapsed_seconds,
                "scrape finished"
            );
            ScrapeRun {
                report,
                records,
                error: None,
            }
        }
        Err(err) => {
            let report = error_report(&err, run_id, started.elapsed());
            tracing::error!(
                %run_id,
                error = %report.message,
                elapsed_seconds = report.elapsed_seconds,
                "scrape failed"
            );
            ScrapeRun {
                report,
                records: Vec::new(),
                error: Some(err),
            }
        }
    }
}

async fn stage_failure(
    portal: &dyn CalendarPortal,
    store: &dyn ObjectStore,
    stage: ScrapeStage,
    err: anyhow::Error,
) -> anyhow::Error {
    let artifact_name = artifact_name_for(stage, &err);
    let debug_artifact = match portal.debug_snapshot().await {
        Ok(snapshot) => save_debug_artifacts(store, &snapshot, artifact_name, Utc::now()).await,
        Err(snap_err) => {
            tracing::error!(error = %snap_err, "failed to capture debug snapshot");
            None
        }
    };

    ScrapeStageError {
        stage,
        detail: format!("{err:#}"),
        artifact_name: Some(artifact_name),
        debug_artifact,
    }
    .into()
}
