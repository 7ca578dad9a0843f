use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use burrow_core::{config::BurrowConfig, status::ClientState};
use burrow_dashboard::{app, publisher::StatusPublisher, shutdown, ws::broadcast::Hub};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "burrow-dashboard", version, about = "Local web dashboard for the burrow tunnel client")]
struct Cli {
    /// Path to burrow.toml (defaults to $BURROW_CONFIG, then ~/.burrow/burrow.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override dashboard.bind.
    #[arg(long)]
    bind: Option<String>,

    /// Override dashboard.port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "burrow_dashboard=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > BURROW_CONFIG env > ~/.burrow/burrow.toml
    let config_path = cli.config.or_else(|| std::env::var("BURROW_CONFIG").ok());
    let mut config = BurrowConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        BurrowConfig::default()
    });
    if let Some(bind) = cli.bind {
        config.dashboard.bind = bind;
    }
    if let Some(port) = cli.port {
        config.dashboard.port = port;
    }

    let client = Arc::new(ClientState::new(burrow_dashboard::client_version()));
    if let Some(ref version) = config.status.server_version {
        client.set_server_version(version.clone());
    }

    let hub = Hub::new(config.hub.subscriber_buffer);
    let publisher = Arc::new(StatusPublisher::new(Arc::clone(&client), hub.clone()));
    let heartbeat = Duration::from_secs(config.status.heartbeat_secs);
    let addr: SocketAddr = config.listen_addr().parse()?;

    let state = Arc::new(app::AppState::new(config, hub, client));
    let router = app::build_router(Arc::clone(&state));

    if !heartbeat.is_zero() {
        let publisher = Arc::clone(&publisher);
        let cancel = state.shutdown.clone();
        tokio::spawn(async move { publisher.run_heartbeat(heartbeat, cancel).await });
    }

    info!("Serving web interface on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::signal(Arc::clone(&state)))
        .await?;

    info!(dropped_events = state.hub.dropped_events(), "dashboard stopped");
    Ok(())
}
