use anyhow::{Context, Result};
use meshroom_core::{Identity, RoomId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What the client remembers between runs. Only a convenience, the server
/// never trusts it.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Continuity {
    pub identity: Option<Identity>,
    pub room: Option<RoomId>,
}

/// A small JSON file holding the last identity and room.
#[derive(Debug, Clone)]
pub struct ContinuityStore {
    path: PathBuf,
}

impl ContinuityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `MESHROOM_STATE`, else `~/.meshroom.json`, else the temp dir.
    pub fn default_location() -> Self {
        let path = std::env::var_os("MESHROOM_STATE")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| Path::new(&h).join(".meshroom.json")))
            .unwrap_or_else(|| std::env::temp_dir().join("meshroom.json"));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file counts as empty.
    pub fn load(&self) -> Continuity {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No continuity state at {}: {}", self.path.display(), e);
                return Continuity::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring corrupt continuity state at {}: {}", self.path.display(), e);
            Continuity::default()
        })
    }

    pub fn save(&self, state: &Continuity) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
