use crate::error::TransferError;
use crate::link::OfferKind;
use crate::transfer::OutboundFile;
use meshroom_core::{IceCandidate, SessionDescription, TransferId};
use tokio::sync::oneshot;

/// Inputs for a single link's event loop, fed by the room runtime.
#[derive(Debug)]
pub enum LinkCommand {
    /// We are the side that calls: build and send an offer.
    StartOffer,

    RemoteOffer {
        offer: SessionDescription,
        kind: OfferKind,
    },

    RemoteAnswer(SessionDescription),

    RemoteCandidate(IceCandidate),

    SendChat(String),

    /// Announce a file already registered in the outbound library.
    OfferFile(OutboundFile),

    AcceptTransfer {
        transfer_id: TransferId,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },

    CancelTransfer(TransferId),

    Close,
}
