//! Keep-alive pinger and uptime reporter for a single web service.
//!
//! Starts the probe loop, the daily report loop and an HTTP server with
//! cron-style triggers:
//!
//! - `GET /health`: liveness of this process.
//! - `GET /ping`: probe the target once and log the results.
//! - `GET /cron/keep-alive`: one full probe cycle, alerts included.
//! - `GET /report`: the last 24 hours as JSON, backed up but not mailed.
//! - `GET /cron/midnight-report`: build and mail the daily report.
//! - `GET /logs`: recent probe results.
//! - `POST /alert`: send a test alert.
//!
//! Run with
//!
//! ```not_rust
//! cargo run -- --config config.yml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uptime_reporter::config::{self, RawConfig};
use uptime_reporter::core::api::AppState;
use uptime_reporter::core::schedule::{report_cycle, schedule_checks, schedule_reports};
use uptime_reporter::core::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file; overrides the application.yml profile lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding application.yml and its profile files
    #[arg(long, default_value = ".")]
    profile_dir: PathBuf,

    /// Build and mail the report for the last 24 hours, then exit
    #[arg(long)]
    report_now: bool,

    /// Print the JSON schema of the configuration file and exit
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> uptime_reporter::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uptime_reporter=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if args.print_schema {
        let schema = schemars::schema_for!(RawConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = config::load(args.config.as_deref(), &args.profile_dir).map_err(|e| {
        tracing::error!("cannot start: {}", e);
        e
    })?;

    let mailer: Arc<dyn Mailer> = match SmtpMailer::new(&config.email) {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            tracing::warn!("mail delivery disabled, backups only: {}", e);
            Arc::new(UnconfiguredMailer)
        }
    };
    let alarm = Arc::new(Alarm::new(
        mailer,
        config.storage.backup_dir.clone(),
        config.service.name.clone(),
        config.service.base_url.clone(),
        config.reporting.tiers.clone(),
        config.reporting.retry.clone(),
    ));
    let store = LogStore::open(&config.storage.log_file).shared();

    if args.report_now {
        let outcome = report_cycle(&store, &alarm, false, Utc::now()).await;
        tracing::info!("{}", outcome.message());
        return Ok(());
    }

    let doctor = Doctor::new(
        &config.service.base_url,
        config.service.endpoints.clone(),
        config.service.methods.clone(),
        config.service.timeout,
    );
    let monitor = Arc::new(Monitor::new(doctor, store.clone(), alarm.clone()));

    schedule_checks(monitor.clone(), config.service.interval);
    schedule_reports(store.clone(), alarm.clone(), config.reporting.clone());
    tracing::info!(
        "monitoring {} at {}",
        config.service.name,
        config.service.base_url
    );

    let state = Arc::new(AppState {
        store,
        monitor,
        alarm,
        reset_logs_after_send: config.reporting.reset_logs_after_send,
    });
    listen(config.server.addr, state).await
}
