use anyhow::{Context, Result};
use meshroom_core::IceServerConfig;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_KNOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Signaling server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// How long a knock on a locked room waits for the host before it is denied.
    pub knock_timeout: Duration,
    /// Handed to every client in the `iceConfig` message.
    pub ice_servers: Vec<IceServerConfig>,
    /// Capacity of the coordinator's command queue.
    pub command_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            knock_timeout: DEFAULT_KNOCK_TIMEOUT,
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
            command_buffer: 256,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `MESHROOM_*` and `TURN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = env::var("MESHROOM_BIND") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("MESHROOM_BIND is not a socket address: {addr}"))?;
        }

        if let Ok(secs) = env::var("MESHROOM_KNOCK_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("MESHROOM_KNOCK_TIMEOUT_SECS is not a number: {secs}"))?;
            config.knock_timeout = Duration::from_secs(secs);
        }

        if let Ok(turn_url) = env::var("TURN_URL") {
            config.ice_servers.push(IceServerConfig {
                urls: vec![turn_url],
                username: env::var("TURN_USERNAME").ok(),
                credential: env::var("TURN_CREDENTIAL").ok(),
            });
        }

        Ok(config)
    }
}
