use meshroom_core::{CodecError, TransferId};
use thiserror::Error;

/// Failures of a single peer link. None of these affect other links.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("an offer is already outstanding on this link")]
    OfferInProgress,

    #[error("unexpected session description: {0}")]
    UnexpectedDescription(String),

    #[error("link is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("negotiation did not complete in time")]
    Timeout,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("file of {size} bytes exceeds the {limit} byte limit")]
    Oversized { size: u64, limit: u64 },

    #[error("unknown transfer {0}")]
    UnknownTransfer(TransferId),

    #[error("transfer {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: TransferId,
        from: &'static str,
        to: &'static str,
    },

    #[error("transfer {id} ended with {received} of {expected} bytes")]
    Truncated {
        id: TransferId,
        received: u64,
        expected: u64,
    },

    #[error("chunk {got} of transfer {id} arrived, expected {expected}")]
    OutOfSequence { id: TransferId, expected: u32, got: u32 },

    #[error("bulk channel closed")]
    ChannelClosed,

    #[error("transfer {0} was cancelled")]
    Cancelled(TransferId),

    #[error("invalid transfer config: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
