use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod app;
mod dispatch;
mod http;
mod service;
mod shutdown;

#[derive(Parser)]
#[command(name = "nexus-gateway", about = "Multi-agent messaging gateway")]
struct Cli {
    /// Path to nexus.toml (default: NEXUS_CONFIG env, then ~/.nexus/nexus.toml).
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the OS service unit for the gateway.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Write the systemd/launchd unit for the current executable.
    Install,
    /// Remove the installed unit.
    Uninstall,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: explicit path > NEXUS_CONFIG env > ~/.nexus/nexus.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("NEXUS_CONFIG").ok());
    let config = nexus_core::config::NexusConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        nexus_core::config::NexusConfig::default()
    });

    if let Some(Command::Service { action }) = cli.command {
        return match action {
            ServiceAction::Install => service::install(config_path.as_deref()),
            ServiceAction::Uninstall => service::uninstall(),
        };
    }

    // A sentinel from the previous process records how it went down.
    shutdown::report_previous_exit(&config);

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config));
    state.start();
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("Nexus gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await?;

    shutdown::finalize(&state).await;
    Ok(())
}
