use async_trait::async_trait;
use meshroom_core::{ConnectionId, ServerMessage};

/// Outbound side of the control plane: how the coordinator reaches clients.
///
/// Delivery is fire-and-forget. A message for a connection that is already
/// gone is dropped.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Send a message to one connection.
    async fn send(&self, connection_id: ConnectionId, msg: ServerMessage);

    /// Force-close a connection, e.g. a ghost evicted by a newer session.
    async fn close(&self, connection_id: ConnectionId);
}
