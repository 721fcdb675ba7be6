use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use meshroom_client::{
    ClientEvent, DEFAULT_NEGOTIATION_TIMEOUT, LinkCommand, LinkContext, LinkHandle,
    OutboundLibrary, PeerLink, TransferConfig, TransferEvent, TransportEvent, TransportFactory,
    spawn_link,
};
use meshroom_core::{Channel, ClientMessage, ConnectionId, TransferId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::memory_channel::MemoryChannel;
use super::mock_transport::MockTransportFactory;

/// Timeout for a single expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Kept small so data in flight is dominated by the channel's own buffer.
const TRANSPORT_BUFFER: usize = 16;

/// One end of two links wired back to back over in-memory channels.
pub struct TestPeer {
    pub id: ConnectionId,
    pub link: LinkHandle,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
    pub signaling: mpsc::UnboundedReceiver<ClientMessage>,
    pub library: OutboundLibrary,
    pub control: Arc<MemoryChannel>,
    pub bulk: Arc<MemoryChannel>,
    transport_tx: mpsc::Sender<TransportEvent>,
}

impl TestPeer {
    pub async fn offer(&self, name: &str, data: Bytes) -> Result<TransferId> {
        let file = self.library.register(name, data)?;
        let transfer_id = file.transfer_id;
        self.link.send(LinkCommand::OfferFile(file)).await;
        Ok(transfer_id)
    }

    pub async fn accept(&self, transfer_id: TransferId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.link
            .send(LinkCommand::AcceptTransfer { transfer_id, reply })
            .await;
        rx.await.context("link dropped the accept")??;
        Ok(())
    }

    pub async fn cancel(&self, transfer_id: TransferId) {
        self.link.send(LinkCommand::CancelTransfer(transfer_id)).await;
    }

    pub async fn chat(&self, text: &str) {
        self.link.send(LinkCommand::SendChat(text.to_owned())).await;
    }

    /// Simulates the transport dropping the bulk channel.
    pub async fn lose_bulk_channel(&self) -> Result<()> {
        self.bulk.close();
        self.transport_tx
            .send(TransportEvent::ChannelClosed(Channel::Bulk))
            .await
            .map_err(|_| anyhow!("link is gone"))
    }

    pub async fn wait_for_event<F>(&mut self, pred: F) -> Result<ClientEvent>
    where
        F: Fn(&ClientEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let evt = tokio::time::timeout_at(deadline, self.events.recv())
                .await
                .context("timed out waiting for event")?;
            match evt {
                Some(e) if pred(&e) => return Ok(e),
                Some(_) => {}
                None => bail!("event channel closed"),
            }
        }
    }

    pub async fn wait_for_transfer<F>(&mut self, pred: F) -> Result<TransferEvent>
    where
        F: Fn(&TransferEvent) -> bool,
    {
        let evt = self
            .wait_for_event(|e| matches!(e, ClientEvent::Transfer(t) if pred(t)))
            .await?;
        match evt {
            ClientEvent::Transfer(t) => Ok(t),
            _ => unreachable!(),
        }
    }

    /// Everything queued right now, without waiting.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

/// Two links, each already holding open control and bulk channels to the other.
pub async fn linked_pair(config: TransferConfig) -> Result<(TestPeer, TestPeer)> {
    let a = ConnectionId::new();
    let b = ConnectionId::new();
    let (a_tx, a_rx) = mpsc::channel(TRANSPORT_BUFFER);
    let (b_tx, b_rx) = mpsc::channel(TRANSPORT_BUFFER);
    let factory = MockTransportFactory::default();

    let mut alice = spawn_peer(a, b, &factory, config.clone(), a_tx.clone(), a_rx, b_tx.clone()).await?;
    let mut bob = spawn_peer(b, a, &factory, config, b_tx, b_rx, a_tx).await?;

    alice
        .wait_for_event(|e| matches!(e, ClientEvent::LinkReady { .. }))
        .await?;
    bob.wait_for_event(|e| matches!(e, ClientEvent::LinkReady { .. }))
        .await?;
    Ok((alice, bob))
}

async fn spawn_peer(
    local: ConnectionId,
    remote: ConnectionId,
    factory: &MockTransportFactory,
    config: TransferConfig,
    own_tx: mpsc::Sender<TransportEvent>,
    own_rx: mpsc::Receiver<TransportEvent>,
    remote_tx: mpsc::Sender<TransportEvent>,
) -> Result<TestPeer> {
    let transport = factory.create(remote, &[], own_tx.clone()).await?;
    let link = PeerLink::new(remote, transport, DEFAULT_NEGOTIATION_TIMEOUT);

    let (signaling_tx, signaling) = mpsc::unbounded_channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let library = OutboundLibrary::new(config.max_file_size);
    let ctx = LinkContext {
        library: library.clone(),
        transfer: config,
        signaling: signaling_tx,
        events: events_tx,
    };
    let handle = spawn_link(link, own_rx, &ctx);

    let control = MemoryChannel::new(Channel::Control, remote_tx.clone());
    let bulk = MemoryChannel::new(Channel::Bulk, remote_tx);
    own_tx
        .send(TransportEvent::ChannelOpen(Channel::Control, control.clone()))
        .await
        .map_err(|_| anyhow!("link is gone"))?;
    own_tx
        .send(TransportEvent::ChannelOpen(Channel::Bulk, bulk.clone()))
        .await
        .map_err(|_| anyhow!("link is gone"))?;

    Ok(TestPeer {
        id: local,
        link: handle,
        events,
        signaling,
        library,
        control,
        bulk,
        transport_tx: own_tx,
    })
}
