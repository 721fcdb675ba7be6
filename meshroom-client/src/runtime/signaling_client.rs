use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use meshroom_core::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const INCOMING_BUFFER: usize = 256;

/// Both directions of a signaling socket as plain channels.
pub struct SignalingConnection {
    pub outgoing: mpsc::UnboundedSender<ClientMessage>,
    pub incoming: mpsc::Receiver<ServerMessage>,
}

impl SignalingConnection {
    /// Wires a connection from existing channels, e.g. an in-process server.
    pub fn from_channels(
        outgoing: mpsc::UnboundedSender<ClientMessage>,
        incoming: mpsc::Receiver<ServerMessage>,
    ) -> Self {
        Self { outgoing, incoming }
    }
}

/// Opens the WebSocket to the signaling server.
///
/// The connection ends when either side of the socket closes; `incoming`
/// then yields `None`.
pub async fn connect_signaling(url: &str) -> Result<SignalingConnection> {
    let (ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to signaling server at {url}"))?;
    info!("Connected to signaling server at {}", url);

    let (mut sender, mut receiver) = ws.split();
    let (outgoing, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (in_tx, incoming) = mpsc::channel(INCOMING_BUFFER);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match msg.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize {:?}: {}", msg, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServerMessage::parse(&text) {
                    Ok(msg) => {
                        if in_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed server message: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Signaling socket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        };
        info!("Signaling connection closed");
    });

    Ok(SignalingConnection { outgoing, incoming })
}
