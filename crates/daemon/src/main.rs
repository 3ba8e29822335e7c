//! wgfleet manager daemon
//!
//! Opens the subscription ledger, syncs operator-configured gateways, and
//! runs the reconciliation, expiry-enforcement, and reminder workers.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wgfleet_daemon::config::DaemonConfig;
use wgfleet_daemon::gateway::HttpGatewayClient;
use wgfleet_daemon::ledger::SubscriptionLedger;
use wgfleet_daemon::notify::HttpNotifier;
use wgfleet_daemon::workers::{
    self, ExpiryEnforcerWorker, ReconciliationWorker, ReminderWorker, Schedule,
};

#[derive(Parser)]
#[command(name = "wgfleetd")]
#[command(about = "wgfleet manager daemon - subscription reconciliation and enforcement")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("wgfleet daemon v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config
        .unwrap_or_else(|| wgfleet_common::default_store_path().join("config.toml"));
    let config = DaemonConfig::load(&config_path)?;

    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db = wgfleet_common::Database::open(&config.db_path)?;

    let ledger = SubscriptionLedger::new(db, config.trial_months);
    ledger.init_schema()?;
    ledger.sync_gateways(&config.gateways)?;

    let gateway = Arc::new(HttpGatewayClient::new(config.gateway_port)?);
    let notifier = Arc::new(HttpNotifier::new(&config.notify_base_url)?);

    let startup_delay = Duration::from_secs(config.workers.startup_delay_secs);

    let reconciler = tokio::spawn(workers::run(
        Schedule {
            name: "Reconciler",
            interval: Duration::from_secs(config.workers.reconcile_interval_secs),
            startup_delay,
        },
        Arc::new(ReconciliationWorker::new(ledger.clone(), gateway.clone())),
    ));

    let enforcer = tokio::spawn(workers::run(
        Schedule {
            name: "Expiry enforcer",
            interval: Duration::from_secs(config.workers.expiry_interval_secs),
            startup_delay,
        },
        Arc::new(ExpiryEnforcerWorker::new(
            ledger.clone(),
            gateway.clone(),
            notifier.clone(),
        )),
    ));

    let reminder = tokio::spawn(workers::run(
        Schedule {
            name: "Expiry reminder",
            interval: Duration::from_secs(config.workers.reminder_interval_secs),
            startup_delay,
        },
        Arc::new(ReminderWorker::new(
            ledger.clone(),
            notifier.clone(),
            chrono::Duration::hours(i64::from(config.reminder_lookahead_hours)),
        )),
    ));

    info!(
        "Daemon started with {} configured gateways",
        config.gateways.len()
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = reconciler => {
            if let Err(e) = result {
                tracing::error!("Reconciler task error: {}", e);
            }
        }
        result = enforcer => {
            if let Err(e) = result {
                tracing::error!("Expiry enforcer task error: {}", e);
            }
        }
        result = reminder => {
            if let Err(e) = result {
                tracing::error!("Expiry reminder task error: {}", e);
            }
        }
    }

    info!("Daemon shutdown complete");
    Ok(())
}
