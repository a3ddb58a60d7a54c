//! CLI entry point.
//!
//! `run` performs one manual dispatch cycle; `start` runs the recurring
//! scheduler until interrupted. Both funnel into the same
//! [`Dispatcher::run_cycle`] entry point, so manual and scheduled runs
//! behave identically.
//!
//! The catalog and user stores belong to the surrounding application; this
//! binary stands them in with JSON data files loaded into an in-memory
//! catalog.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use gazette::assets::FsAssetStore;
use gazette::config::AppConfig;
use gazette::content::{InMemoryCatalog, ReleaseItem, Subscriber};
use gazette::delivery::{DeliveryEngine, SmtpTransport};
use gazette::dispatch::Dispatcher;
use gazette::schedule::{FileStateStore, Trigger};

#[derive(Parser)]
#[command(name = "gazette", about = "Scheduled release-newsletter dispatch")]
struct Cli {
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one dispatch cycle now and print the summary.
    Run,
    /// Run the recurring scheduler until interrupted.
    Start,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    let config = AppConfig::from_env().context("loading configuration")?;

    let catalog = load_catalog(&config).await?;
    let assets = FsAssetStore::new(&config.asset_dir);
    let transport = SmtpTransport::from_config(&config.smtp).context("building SMTP transport")?;
    let delivery = DeliveryEngine::new(transport, config.smtp.from.clone(), config.send_spacing());
    let dispatcher = Dispatcher::new(
        catalog,
        assets,
        delivery,
        config.timezone,
        config.window_days,
    );

    let shutdown = shutdown_channel();

    match cli.command {
        Commands::Run => {
            let report = dispatcher.run_cycle(Utc::now(), &shutdown).await;
            println!("{}", report.summary());
        }
        Commands::Start => {
            let store = FileStateStore::new(&config.state_path);
            let trigger = Trigger::new(config.schedule.clone(), config.timezone, store, dispatcher);
            trigger.run(shutdown).await.context("scheduler loop failed")?;
        }
    }

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Flip a watch channel when SIGINT or SIGTERM arrives. The dispatcher
/// checks it between subscribers, the trigger between slots.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn load_catalog(config: &AppConfig) -> Result<InMemoryCatalog> {
    let subscribers: Vec<Subscriber> = read_json(&config.subscribers_path).await?;
    let releases: Vec<ReleaseItem> = read_json(&config.releases_path).await?;
    tracing::debug!(
        subscribers = subscribers.len(),
        releases = releases.len(),
        "catalog data loaded"
    );
    Ok(InMemoryCatalog::new(subscribers, releases))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}
