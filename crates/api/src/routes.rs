use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use otelms_core::domain::report::{HealthReport, RunStatus, ScrapeReport};
use otelms_core::pipeline::{run_and_report, ScrapeOptions};
use otelms_core::portal::{ChromePortal, PortalConfig};
use otelms_core::storage::GcsStore;
use otelms_core::sync::{RowsClient, SheetSync};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self) -> (ScrapeReport, Option<anyhow::Error>);
}

/// Launches a fresh browser for every run and tears it down afterwards.
pub struct ChromeScraper {
    pub portal: PortalConfig,
    pub store: GcsStore,
    pub rows: Option<RowsClient>,
    pub options: ScrapeOptions,
}

#[async_trait::async_trait]
impl Scraper for ChromeScraper {
    async fn scrape(&self) -> (ScrapeReport, Option<anyhow::Error>) {
        tracing::info!(version = otelms_core::VERSION, "calendar scrape started");
        let started = Instant::now();

        let portal = match ChromePortal::open(self.portal.clone()).await {
            Ok(portal) => portal,
            Err(err) => {
                let report = otelms_core::pipeline::error_report(&err, Uuid::new_v4(), started.elapsed());
                tracing::error!(error = %report.message, "browser launch failed");
                return (report, Some(err));
            }
        };

        let sync = self.rows.as_ref().map(|rows| rows as &dyn SheetSync);
        let run = run_and_report(&portal, &self.store, sync, &self.options).await;
        drop(portal);
        tracing::info!("browser closed");
        run.into_parts()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub scraper: Option<Arc<dyn Scraper>>,
    // One browser at a time.
    pub run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(scraper: Option<Arc<dyn Scraper>>) -> Self {
        Self {
            scraper,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(scrape).post(scrape))
        .route("/scrape", get(scrape).post(scrape))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthReport> {
    Json(HealthReport::healthy(otelms_core::VERSION, chrono::Utc::now()))
}

async fn scrape(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ScrapeReport>), StatusCode> {
    let Some(scraper) = state.scraper.clone() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    // The spawned run holds the lock until its browser is closed, even if the
    // request is dropped.
    let guard = state.run_lock.clone().lock_owned().await;
    let run = tokio::spawn(async move {
        let _guard = guard;
        scraper.scrape().await
    });
    let (report, err) = run.await.map_err(|err| {
        tracing::error!(error = %err, "scrape task aborted");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if let Some(err) = &err {
        sentry_anyhow::capture_anyhow(err);
    }

    let status = match report.status {
        RunStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        RunStatus::Success | RunStatus::Warning => StatusCode::OK,
    };
    Ok((status, Json(report)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    struct FixedScraper {
        status: RunStatus,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Scraper for FixedScraper {
        async fn scrape(&self) -> (ScrapeReport, Option<anyhow::Error>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = chrono::Utc::now();
            match self.status {
                RunStatus::Success => (
                    ScrapeReport::success(
                        Uuid::nil(),
                        51,
                        "otelms_calendar_20260127_100000.json".to_string(),
                        false,
                        Duration::from_secs(3),
                        now,
                    ),
                    None,
                ),
                RunStatus::Warning => (ScrapeReport::empty(Uuid::nil(), Duration::ZERO, now), None),
                RunStatus::Error => (
                    ScrapeReport::error(
                        Uuid::nil(),
                        "login failed: no redirect occurred".to_string(),
                        None,
                        Duration::ZERO,
                        now,
                    ),
                    Some(anyhow::anyhow!("login failed")),
                ),
            }
        }
    }

    fn app(status: RunStatus) -> (Router, Arc<FixedScraper>) {
        let scraper = Arc::new(FixedScraper {
            status,
            calls: AtomicU32::new(0),
        });
        let state = AppState::new(Some(scraper.clone() as Arc<dyn Scraper>));
        (router(state), scraper)
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (app, scraper) = app(RunStatus::Success);
        let (status, body) = call(app, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], otelms_core::VERSION);
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn post_scrape_returns_success_report() {
        let (app, scraper) = app(RunStatus::Success);
        let (status, body) = call(app, Method::POST, "/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data_points"], 51);
        assert_eq!(body["gcs_file"], "otelms_calendar_20260127_100000.json");
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn root_also_triggers_scrape() {
        let (app, scraper) = app(RunStatus::Warning);
        let (status, body) = call(app, Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "warning");
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_run_is_a_server_error() {
        let (app, _) = app(RunStatus::Error);
        let (status, body) = call(app, Method::POST, "/scrape").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("no redirect"));
    }

    #[tokio::test]
    async fn unconfigured_service_is_unavailable() {
        let app = router(AppState::new(None));
        let (status, _) = call(app.clone(), Method::POST, "/scrape").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = call(app, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[derive(Default)]
    struct GatedScraper {
        started: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl Scraper for GatedScraper {
        async fn scrape(&self) -> (ScrapeReport, Option<anyhow::Error>) {
            self.started.notify_one();
            self.release.notified().await;
            (
                ScrapeReport::empty(Uuid::nil(), Duration::ZERO, chrono::Utc::now()),
                None,
            )
        }
    }

    #[tokio::test]
    async fn dropped_request_keeps_lock_until_run_finishes() {
        let scraper = Arc::new(GatedScraper::default());
        let state = AppState::new(Some(scraper.clone() as Arc<dyn Scraper>));
        let lock = state.run_lock.clone();
        let app = router(state);

        let request = tokio::spawn(call(app, Method::POST, "/scrape"));
        scraper.started.notified().await;
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        assert!(lock.try_lock().is_err());

        scraper.release.notify_one();
        let released = tokio::time::timeout(Duration::from_secs(5), lock.lock()).await;
        assert!(released.is_ok());
    }
}
