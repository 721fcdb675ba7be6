use async_trait::async_trait;
use meshroom_core::{ConnectionId, ServerMessage};
use meshroom_server::SignalingOutput;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Sent {
        to: ConnectionId,
        msg: ServerMessage,
    },
    Closed {
        connection_id: ConnectionId,
    },
}

/// Mock SignalingOutput that captures all outgoing signals.
#[derive(Clone)]
pub struct MockSignalingOutput {
    /// Channel to send captured signals.
    tx: mpsc::UnboundedSender<Signal>,
    /// All captured signals (for verification).
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl MockSignalingOutput {
    /// Create a new MockSignalingOutput and its receiver channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let signaling = Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
        };
        (signaling, rx)
    }

    /// Everything sent to one connection, in send order.
    pub async fn sent_to(&self, connection_id: ConnectionId) -> Vec<ServerMessage> {
        self.signals
            .lock()
            .await
            .iter()
            .filter_map(|s| match s {
                Signal::Sent { to, msg } if *to == connection_id => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn was_closed(&self, connection_id: ConnectionId) -> bool {
        self.signals
            .lock()
            .await
            .iter()
            .any(|s| matches!(s, Signal::Closed { connection_id: id } if *id == connection_id))
    }

    async fn record(&self, signal: Signal) {
        self.signals.lock().await.push(signal.clone());
        let _ = self.tx.send(signal);
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn send(&self, connection_id: ConnectionId, msg: ServerMessage) {
        tracing::debug!("[MockSignaling] send to {:?}: {:?}", connection_id, msg);
        self.record(Signal::Sent {
            to: connection_id,
            msg,
        })
        .await;
    }

    async fn close(&self, connection_id: ConnectionId) {
        tracing::debug!("[MockSignaling] close {:?}", connection_id);
        self.record(Signal::Closed { connection_id }).await;
    }
}
