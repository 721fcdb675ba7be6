use anyhow::{Context, Result};
use clap::Parser;
use meshroom_core::IceServerConfig;
use meshroom_server::{ServerConfig, router, spawn_sessions};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Signaling server for meshroom rooms.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on (overrides MESHROOM_BIND)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Seconds a knock waits for the host before it is denied
    #[arg(long)]
    knock_timeout: Option<u64>,

    /// Extra STUN/TURN urls handed to clients
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(secs) = args.knock_timeout {
        config.knock_timeout = Duration::from_secs(secs);
    }
    config
        .ice_servers
        .extend(args.ice_servers.into_iter().map(|url| IceServerConfig {
            urls: vec![url],
            username: None,
            credential: None,
        }));

    info!("Initializing signaling server...");
    let state = spawn_sessions(&config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Signaling server listening on ws://{}/ws", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
