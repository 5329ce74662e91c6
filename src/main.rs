//! CLI entry point for the boia dashboard client.
//!
//! Provides subcommands for logging in, managing devices, aggregating raw
//! position samples, exporting the per-device metrics dashboard to CSV, and
//! following the latest device positions.

mod infra;
mod services;

use crate::infra::backend::BackendClient;
use crate::infra::session::Session;
use crate::services::dashboard::{collect_dashboard, latest_locations};
use crate::services::device_api::DeviceApi;
use anyhow::{Context, Result, anyhow};
use boia_dashboard::{
    fetch::{BasicClient, fetch_bytes},
    metrics::{DashboardMetrics, aggregate, types::parse_datetime},
    output::{Period, export_to_file, print_json, print_pretty},
    parser::{load_samples, parse_samples_json},
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "boia_dashboard")]
#[command(about = "Travel metrics for tracked devices", long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "BOIA_API_URL", default_value = "http://localhost:3000", global = true)]
    api_url: String,

    /// Where the login session is stored
    #[arg(long, env = "BOIA_SESSION_FILE", default_value = ".boia_session.json", global = true)]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        #[arg(long)]
        mail: String,
        #[arg(long, env = "BOIA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log into it
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        mail: String,
        #[arg(long, env = "BOIA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the user the current token belongs to
    Whoami,
    /// Manage tracked devices
    Devices {
        #[command(subcommand)]
        action: DeviceAction,
    },
    /// Aggregate raw samples from a CSV/JSON file or a URL returning JSON samples
    Aggregate {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
    /// Compute metrics for every device over a period and export them to CSV
    Dashboard {
        /// Period start, RFC 3339 (default: `--days` before the end)
        #[arg(long)]
        start: Option<String>,

        /// Period end, RFC 3339 (default: now)
        #[arg(long)]
        end: Option<String>,

        /// Period length in days when `--start` is not given
        #[arg(long, default_value_t = 7)]
        days: i64,

        /// Directory to write the CSV export to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Maximum number of devices fetched at once
        #[arg(short, long, default_value_t = 5)]
        concurrency: usize,
    },
    /// Periodically report the latest position of every device
    Map {
        /// Seconds between refreshes
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Number of refreshes (0 = until interrupted)
        #[arg(short = 'n', long, default_value_t = 0)]
        rounds: usize,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// List your devices
    List,
    /// Register a new device
    Create { name: String },
    /// Rename a device
    Rename { id: String, name: String },
    /// Delete a device
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/boia_dashboard.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("boia_dashboard.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Login { mail, password } => {
            let session = BackendClient::login(&cli.api_url, &mail, &password).await?;
            session.save(&cli.session_file)?;
            info!(user_id = %session.user.id, "Session stored");
        }
        Commands::Register {
            name,
            mail,
            password,
        } => {
            let session = BackendClient::register(&cli.api_url, &name, &mail, &password).await?;
            session.save(&cli.session_file)?;
            info!(user_id = %session.user.id, "Account created, session stored");
        }
        Commands::Logout => {
            Session::clear(&cli.session_file)?;
            info!("Session cleared");
        }
        Commands::Whoami => {
            let session = authenticate(&cli.api_url, &cli.session_file).await?;
            info!(
                user_id = %session.user.id,
                name = session.user.name.as_deref().unwrap_or(""),
                mail = session.user.mail.as_deref().unwrap_or(""),
                "Authenticated"
            );
        }
        Commands::Devices { action } => {
            let session = authenticate(&cli.api_url, &cli.session_file).await?;
            let client = BackendClient::connect(&cli.api_url, &session)?;
            run_device_action(&client, action).await?;
        }
        Commands::Aggregate { source } => {
            let samples = if is_remote(&source) {
                let bytes = fetch_bytes(&BasicClient::new()?, &source).await?;
                parse_samples_json(&bytes)?
            } else {
                load_samples(Path::new(&source))?
            };
            info!(samples = samples.len(), "Samples loaded");

            let metrics = aggregate(&samples);
            print_pretty(&metrics);
            print_json(&metrics)?;
        }
        Commands::Dashboard {
            start,
            end,
            days,
            output_dir,
            concurrency,
        } => {
            let period = resolve_period(start.as_deref(), end.as_deref(), days)?;
            let session = authenticate(&cli.api_url, &cli.session_file).await?;
            let client = Arc::new(BackendClient::connect(&cli.api_url, &session)?);

            let devices = client.list_devices().await?;
            if devices.is_empty() {
                warn!("No devices registered, nothing to export");
                return Ok(());
            }

            let results = collect_dashboard(client, &devices, period, concurrency).await;
            for device in &results {
                log_metrics(&device.device_id, &device.device_name, &device.metrics);
            }

            let path = export_to_file(&output_dir, &results, &period)?;
            info!(path = %path.display(), "Dashboard exported");
        }
        Commands::Map { interval, rounds } => {
            let session = authenticate(&cli.api_url, &cli.session_file).await?;
            let client = BackendClient::connect(&cli.api_url, &session)?;
            follow_locations(&client, interval, rounds).await?;
        }
    }

    Ok(())
}

/// Restores the stored session (or `BOIA_TOKEN`) and checks it with the backend.
///
/// A rejected token is dropped from the session file.
async fn authenticate(api_url: &str, session_file: &Path) -> Result<Session> {
    let stored = Session::load(session_file)?;

    let token = match std::env::var("BOIA_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => stored
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or_else(|| anyhow!("Not logged in, run `login` first"))?,
    };

    match BackendClient::validate_token(api_url, &token).await? {
        Some(user) => Ok(Session { token, user }),
        None => {
            if stored.is_some_and(|s| s.token == token) {
                Session::clear(session_file)?;
            }
            Err(anyhow!("Session expired or invalid, run `login` again"))
        }
    }
}

async fn run_device_action<A: DeviceApi>(api: &A, action: DeviceAction) -> Result<()> {
    match action {
        DeviceAction::List => {
            let devices = api.list_devices().await?;
            info!(total = devices.len(), "Device list fetched");
            for device in &devices {
                info!(device_id = %device.id, name = %device.name, "Device");
            }
        }
        DeviceAction::Create { name } => {
            api.create_device(&name).await?;
            info!(name = %name, "Device created");
        }
        DeviceAction::Rename { id, name } => {
            api.update_device(&id, &name).await?;
            info!(device_id = %id, name = %name, "Device renamed");
        }
        DeviceAction::Delete { id } => {
            api.delete_device(&id).await?;
            info!(device_id = %id, "Device deleted");
        }
    }
    Ok(())
}

/// `http(s)://` URLs are fetched; everything else is a local path.
fn is_remote(source: &str) -> bool {
    reqwest::Url::parse(source).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

fn resolve_period(start: Option<&str>, end: Option<&str>, days: i64) -> Result<Period> {
    let end = match end {
        Some(raw) => parse_datetime(raw).context("Failed on parse the end time")?,
        None => Utc::now(),
    };
    let period = match start {
        Some(raw) => Period::new(
            parse_datetime(raw).context("Failed on parse the start time")?,
            end,
        ),
        None => Period::last_days(end, days)?,
    };

    if period.start > period.end {
        return Err(anyhow!("Period start is after its end"));
    }
    Ok(period)
}

fn log_metrics(device_id: &str, device_name: &str, metrics: &DashboardMetrics) {
    info!(
        device_id,
        device_name,
        metros_percorridos = metrics.metros_percorridos,
        media_metros_dia = metrics.media_metros_dia,
        media_velocidade = metrics.media_velocidade,
        down_time_pct = metrics.down_time_probability * 100.0,
        "Device metrics"
    );
}

/// Refreshes device locations every `interval` seconds, `rounds` times (0 = forever).
#[tracing::instrument(skip(api))]
async fn follow_locations<A: DeviceApi>(api: &A, interval: u64, rounds: usize) -> Result<()> {
    let devices = api.list_devices().await?;
    if devices.is_empty() {
        warn!("No devices registered");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(interval.max(1)));
    let mut round = 0;

    loop {
        if rounds > 0 && round >= rounds {
            break;
        }
        ticker.tick().await;
        round += 1;

        let locations = latest_locations(api, &devices).await;
        info!(round, located = locations.len(), "Locations refreshed");

        for loc in &locations {
            info!(
                device_id = %loc.id,
                name = %loc.name,
                latitude = loc.latitude,
                longitude = loc.longitude,
                speed_kmh = loc.speed,
                last_update = %loc.last_update,
                "Device location"
            );
        }
    }

    Ok(())
}
