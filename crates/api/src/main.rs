use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use otelms_core::config::Settings;
use otelms_core::pipeline::ScrapeOptions;
use otelms_core::portal::PortalConfig;
use otelms_core::storage::GcsStore;
use otelms_core::sync::RowsClient;

mod routes;

use routes::{AppState, ChromeScraper, Scraper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let scraper: Option<Arc<dyn Scraper>> = match build_scraper(&settings) {
        Ok(scraper) => Some(Arc::new(scraper)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "scraper configuration incomplete; starting API in degraded mode");
            None
        }
    };

    let app = routes::router(AppState::new(scraper));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, version = otelms_core::VERSION, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_scraper(settings: &Settings) -> anyhow::Result<ChromeScraper> {
    settings.validate_for_scrape()?;
    Ok(ChromeScraper {
        portal: PortalConfig::from_settings(settings)?,
        store: GcsStore::from_settings(settings)?,
        rows: RowsClient::from_settings(settings)?,
        options: ScrapeOptions::from_settings(settings),
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
