use crate::error::TransferError;
use meshroom_core::{IceServerConfig, Identity, RoomId};
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024 * 1024;
pub const DEFAULT_LOW_WATER_MARK: usize = 256 * 1024;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Chunking and flow-control limits for file transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub chunk_size: usize,
    /// Emission pauses once the channel holds more than this many unsent bytes.
    pub high_water_mark: usize,
    /// Emission resumes once the channel drains below this.
    pub low_water_mark: usize,
    /// Upper bound for a single file; reassembly happens in memory.
    pub max_file_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig("chunk_size must be positive"));
        }
        if self.low_water_mark >= self.high_water_mark {
            return Err(TransferError::InvalidConfig(
                "low_water_mark must be below high_water_mark",
            ));
        }
        if self.chunk_size > self.high_water_mark {
            return Err(TransferError::InvalidConfig(
                "chunk_size must not exceed high_water_mark",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the signaling server, e.g. `ws://localhost:8000/ws`.
    pub server_url: String,
    pub identity: Identity,
    pub room: RoomId,
    /// Used until the server sends its own `iceConfig`.
    pub ice_servers: Vec<IceServerConfig>,
    /// A negotiation attempt that does not reach a stable state in time fails.
    pub negotiation_timeout: Duration,
    pub transfer: TransferConfig,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, identity: Identity, room: RoomId) -> Self {
        Self {
            server_url: server_url.into(),
            identity,
            room,
            ice_servers: Vec::new(),
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            transfer: TransferConfig::default(),
        }
    }
}
