use meshroom_core::{ClientMessage, ConnectionId, Identity, ServerMessage};

/// A negotiation message rewritten for its recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

/// Stateless router for offer/answer/candidate messages.
///
/// Payloads are passed through untouched; only the sender is attached.
/// Whether the recipient is still connected is the output's concern.
#[derive(Debug, Default, Clone, Copy)]
pub struct NegotiationRelay;

impl NegotiationRelay {
    /// Returns `None` for messages that are not negotiation traffic.
    pub fn route(
        from: ConnectionId,
        from_identity: Option<Identity>,
        message: ClientMessage,
    ) -> Option<Routed> {
        let (to, message) = match message {
            ClientMessage::Call { to, offer } => (
                to,
                ServerMessage::IncomingCall {
                    from,
                    offer,
                    from_identity,
                },
            ),
            ClientMessage::CallAccepted { to, answer } => {
                (to, ServerMessage::CallAccepted { from, answer })
            }
            ClientMessage::Renegotiate { to, offer } => {
                (to, ServerMessage::RenegotiateNeeded { from, offer })
            }
            ClientMessage::RenegotiateDone { to, answer } => {
                (to, ServerMessage::RenegotiateFinal { from, answer })
            }
            ClientMessage::Candidate { to, candidate } => {
                (to, ServerMessage::Candidate { from, candidate })
            }
            _ => return None,
        };

        Some(Routed { to, message })
    }
}
