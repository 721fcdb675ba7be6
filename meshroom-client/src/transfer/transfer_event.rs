use crate::transfer::transfer::Direction;
use bytes::Bytes;
use meshroom_core::{ConnectionId, TransferId};

/// Transfer lifecycle notifications for the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A peer announced a file.
    Offered {
        peer: ConnectionId,
        transfer_id: TransferId,
        name: String,
        size: u64,
    },
    Progress {
        peer: ConnectionId,
        transfer_id: TransferId,
        direction: Direction,
        percent: u8,
    },
    Completed {
        peer: ConnectionId,
        transfer_id: TransferId,
        direction: Direction,
        name: String,
        /// Reassembled file, receive side only.
        data: Option<Bytes>,
    },
    Cancelled {
        peer: ConnectionId,
        transfer_id: TransferId,
        direction: Direction,
    },
    Failed {
        peer: ConnectionId,
        transfer_id: TransferId,
        direction: Direction,
        reason: String,
    },
}

impl TransferEvent {
    pub fn transfer_id(&self) -> TransferId {
        match self {
            TransferEvent::Offered { transfer_id, .. }
            | TransferEvent::Progress { transfer_id, .. }
            | TransferEvent::Completed { transfer_id, .. }
            | TransferEvent::Cancelled { transfer_id, .. }
            | TransferEvent::Failed { transfer_id, .. } => *transfer_id,
        }
    }
}
