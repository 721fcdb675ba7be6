use crate::error::CodecError;
use crate::model::Channel;
use crate::traits::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct TransferId(pub Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for TransferId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CodecError::InvalidId(s.to_owned()))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything that travels on the bulk channel.
///
/// Chunks are an explicit variant tagged with their transfer, so a receiver
/// never has to guess which transfer a payload belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BulkFrame {
    Offer {
        transfer_id: TransferId,
        name: String,
        size: u64,
    },
    Request {
        transfer_id: TransferId,
    },
    Cancel {
        transfer_id: TransferId,
    },
    Complete {
        transfer_id: TransferId,
    },
    Chunk {
        transfer_id: TransferId,
        seq: u32,
        #[serde(with = "serde_bytes")]
        data: Vec<u8>,
    },
}

impl BulkFrame {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            BulkFrame::Offer { transfer_id, .. }
            | BulkFrame::Request { transfer_id }
            | BulkFrame::Cancel { transfer_id }
            | BulkFrame::Complete { transfer_id }
            | BulkFrame::Chunk { transfer_id, .. } => *transfer_id,
        }
    }
}

impl Record for BulkFrame {
    fn channel(&self) -> Channel {
        Channel::Bulk
    }
}
