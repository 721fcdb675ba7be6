use meshroom_core::{ClientMessage, ConnectionId, RoomId};

/// Commands that reach the coordinator from the signaling layer.
#[derive(Debug)]
pub enum SessionCommand {
    /// A parsed control-plane message from an open socket.
    Client {
        connection_id: ConnectionId,
        message: ClientMessage,
    },

    /// The socket closed, gracefully or not.
    Disconnect { connection_id: ConnectionId },
}

/// Events the coordinator schedules for itself.
#[derive(Debug)]
pub(crate) enum TimerEvent {
    KnockExpired {
        requester: ConnectionId,
        room_id: RoomId,
        /// Distinguishes a stale timer from the one guarding a newer knock.
        knock_id: u64,
    },
}
