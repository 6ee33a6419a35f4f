use anyhow::Context;
use clap::{Parser, Subcommand};
use otelms_core::config::Settings;
use otelms_core::domain::booking::BookingRecord;
use otelms_core::domain::report::{RunStatus, ScrapeReport};
use otelms_core::pipeline::{run_and_report, ScrapeOptions};
use otelms_core::portal::{ChromePortal, PortalConfig};
use otelms_core::storage::{GcsStore, LocalDirStore, ObjectStore};
use otelms_core::sync::{RowsClient, SheetSync};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod offline;

#[derive(Debug, Parser)]
#[command(name = "otelms_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one full scrape: log in, extract the calendar, upload the JSON.
    Run {
        /// Write output and debug artifacts into this directory instead of GCS.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Skip the Rows.com sync even when it is configured.
        #[arg(long)]
        no_sync: bool,

        /// Number of extracted records to print with the report.
        #[arg(long, default_value_t = 3)]
        sample: usize,
    },

    /// Extract bookings from a saved calendar page (e.g. a downloaded debug HTML).
    Extract {
        /// Path to the HTML file.
        html: PathBuf,

        /// Number of records to print.
        #[arg(long, default_value_t = 3)]
        sample: usize,

        /// Additional CSS selector to count matches for.
        #[arg(long)]
        selector: Option<String>,
    },
}

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

    let args = Args::parse();

    match args.command {
        Command::Run {
            output_dir,
            no_sync,
            sample,
        } => run(&settings, output_dir, no_sync, sample).await,
        Command::Extract {
            html,
            sample,
            selector,
        } => {
            let summary = offline::extract_file(&html, sample, selector.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

async fn run(
    settings: &Settings,
    output_dir: Option<PathBuf>,
    no_sync: bool,
    sample: usize,
) -> anyhow::Result<()> {
    let store: Box<dyn ObjectStore> = match output_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "writing output to local directory");
            Box::new(LocalDirStore::new(dir))
        }
        None => Box::new(GcsStore::from_settings(settings)?),
    };

    let rows = if no_sync {
        None
    } else {
        RowsClient::from_settings(settings)?
    };
    let sync = rows.as_ref().map(|rows| rows as &dyn SheetSync);

    let portal = ChromePortal::open(PortalConfig::from_settings(settings)?)
        .await
        .context("failed to start browser")?;
    let options = ScrapeOptions::from_settings(settings);

    let run = run_and_report(&portal, store.as_ref(), sync, &options).await;
    drop(portal);

    let printed = report_with_sample(&run.report, &run.records, sample)?;
    println!("{}", serde_json::to_string_pretty(&printed)?);

    let report = run.report;
    match run.error {
        Some(err) => {
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
        None => {
            if report.status == RunStatus::Warning {
                tracing::warn!("run finished without data");
            }
            Ok(())
        }
    }
}

/// The run report with the first `sample` records attached under `sample`.
fn report_with_sample(
    report: &ScrapeReport,
    records: &[BookingRecord],
    sample: usize,
) -> anyhow::Result<serde_json::Value> {
    let mut printed = serde_json::to_value(report)?;
    if report.status != RunStatus::Error {
        printed["sample"] = serde_json::to_value(&records[..sample.min(records.len())])?;
    }
    Ok(printed)
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
