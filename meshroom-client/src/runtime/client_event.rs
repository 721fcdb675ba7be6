use crate::link::NegotiationState;
use crate::transfer::TransferEvent;
use meshroom_core::{ConnectionId, DenyReason, ErrorCode, Identity, MemberInfo, Role, RoomId};

/// Everything the embedding UI gets to see, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected {
        connection_id: ConnectionId,
    },
    Joined {
        room_id: RoomId,
        role: Role,
        locked: bool,
        existing_members: Vec<MemberInfo>,
    },
    Waiting,
    Approved,
    Denied {
        reason: DenyReason,
    },
    Kicked,
    MemberJoined {
        connection_id: ConnectionId,
        identity: Identity,
    },
    MemberLeft {
        connection_id: ConnectionId,
        identity: Identity,
    },
    Roster {
        members: Vec<MemberInfo>,
    },
    HostChanged {
        connection_id: ConnectionId,
        identity: Identity,
        is_self: bool,
    },
    Locked(bool),
    Knock {
        identity: Identity,
        requester: ConnectionId,
    },
    Chat {
        from: ConnectionId,
        text: String,
        sent_at: u64,
    },
    LinkState {
        peer: ConnectionId,
        state: NegotiationState,
    },
    /// Both data channels to `peer` are open.
    LinkReady {
        peer: ConnectionId,
    },
    LinkClosed {
        peer: ConnectionId,
    },
    Transfer(TransferEvent),
    ServerError {
        code: ErrorCode,
        message: String,
    },
    Disconnected,
}
