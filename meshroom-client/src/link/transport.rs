use crate::error::LinkError;
use async_trait::async_trait;
use bytes::Bytes;
use meshroom_core::{Channel, ConnectionId, IceCandidate, IceServerConfig, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The negotiation half of a point-to-point connection.
///
/// Implementations wrap a real peer connection; tests use a scripted one.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    async fn create_offer(&self) -> Result<SessionDescription, LinkError>;
    async fn create_answer(&self) -> Result<SessionDescription, LinkError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError>;
    async fn close(&self) -> Result<(), LinkError>;
}

/// An ordered, reliable message channel with an observable send buffer.
#[async_trait]
pub trait DataChannel: Send + Sync + 'static {
    fn label(&self) -> &str;
    fn is_open(&self) -> bool;
    async fn send(&self, data: Bytes) -> Result<(), LinkError>;
    /// Bytes handed to the channel but not yet put on the wire.
    async fn buffered_amount(&self) -> usize;
    /// Resolves once at most `threshold` bytes remain buffered.
    async fn wait_buffered_low(&self, threshold: usize) -> Result<(), LinkError>;
}

/// What a transport reports back to the link that owns it.
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    ChannelOpen(Channel, Arc<dyn DataChannel>),
    Message(Channel, Bytes),
    ChannelClosed(Channel),
    Disconnected,
}

/// Builds one transport per remote participant.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: SessionTransport;

    async fn create(
        &self,
        remote: ConnectionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self::Transport, LinkError>;
}
