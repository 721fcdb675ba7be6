use crate::error::TransferError;
use bytes::Bytes;
use meshroom_core::{ConnectionId, TransferId};
use tokio::sync::oneshot;

/// Requests from the embedding UI to the room runtime.
#[derive(Debug)]
pub enum RoomCommand {
    /// Chat to every linked participant.
    Chat(String),

    /// Register a file and announce it on every current link.
    OfferFile {
        name: String,
        data: Bytes,
        reply: oneshot::Sender<Result<TransferId, TransferError>>,
    },

    AcceptTransfer {
        peer: ConnectionId,
        transfer_id: TransferId,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },

    CancelTransfer(TransferId),

    // Host controls; the server rejects them from guests.
    Lock(bool),
    Kick(ConnectionId),
    Approve(ConnectionId),
    Deny(ConnectionId),

    Leave,
}
