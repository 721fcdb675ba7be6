/// Where a [`PeerLink`](super::PeerLink) stands in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,

    // Offering side.
    LocalOfferPending,
    LocalOfferSet,
    AnswerAwaited,

    // Answering side.
    RemoteOfferReceived,
    AnswerCreated,

    Stable,
    /// A description could not be applied or the attempt timed out.
    /// Only a fresh offer leaves this state.
    Failed,
    Closed,
}

impl NegotiationState {
    /// Whether a new local offer may start from here.
    pub fn can_offer(&self) -> bool {
        matches!(
            self,
            NegotiationState::Idle | NegotiationState::Stable | NegotiationState::Failed
        )
    }

    /// Whether an offer/answer exchange is in flight.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            NegotiationState::LocalOfferPending
                | NegotiationState::LocalOfferSet
                | NegotiationState::AnswerAwaited
                | NegotiationState::RemoteOfferReceived
                | NegotiationState::AnswerCreated
        )
    }

    pub fn is_offering(&self) -> bool {
        matches!(
            self,
            NegotiationState::LocalOfferPending
                | NegotiationState::LocalOfferSet
                | NegotiationState::AnswerAwaited
        )
    }

    pub fn is_closed(&self) -> bool {
        *self == NegotiationState::Closed
    }
}
