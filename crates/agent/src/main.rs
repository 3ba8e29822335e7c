//! wgfleet gateway agent
//!
//! Serves the gateway HTTP API and owns the local WireGuard peer config.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod allocator;
mod config;
mod iface;
mod keys;
mod provisioner;
mod routes;
mod wgconf;

use config::AgentConfig;
use iface::WgSyncControl;
use keys::X25519KeyProvider;
use provisioner::PeerProvisioner;
use routes::AgentState;

#[derive(Parser)]
#[command(name = "wgfleet-agent")]
#[command(about = "wgfleet gateway agent - WireGuard peer provisioning API")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/wgfleet/agent.toml")]
    config: PathBuf,

    /// HTTP listen port override
    #[arg(short, long)]
    port: Option<u16>,

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

    info!("wgfleet agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AgentConfig::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if !config.config_path.exists() {
        anyhow::bail!(
            "interface config {:?} does not exist; bring up the interface first",
            config.config_path
        );
    }
    tokio::fs::create_dir_all(&config.clients_dir).await?;

    let listen_port = config.listen_port;
    let interface = config.interface.clone();
    let provisioner = Arc::new(PeerProvisioner::new(
        config,
        Arc::new(X25519KeyProvider),
        Arc::new(WgSyncControl),
    ));

    let app = routes::router(Arc::new(AgentState { provisioner }));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], listen_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Agent for {} listening on {}", interface, addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Agent shutdown complete");
    Ok(())
}
