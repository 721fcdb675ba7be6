use anyhow::{Context, Result, bail};
use meshroom_core::{ClientMessage, ConnectionId, Identity, RoomId, ServerMessage};
use meshroom_server::SessionCommand;
use std::time::Duration;
use tokio::sync::mpsc;

use super::mock_signaling::Signal;

/// Timeout for a single expected signal (ms).
pub const SIGNAL_TIMEOUT_MS: u64 = 2000;

pub async fn send_message(
    cmd_tx: &mpsc::Sender<SessionCommand>,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Result<()> {
    cmd_tx
        .send(SessionCommand::Client {
            connection_id,
            message,
        })
        .await
        .context("coordinator is gone")
}

pub async fn send_join(
    cmd_tx: &mpsc::Sender<SessionCommand>,
    connection_id: ConnectionId,
    identity: &str,
    room: &str,
) -> Result<()> {
    send_message(
        cmd_tx,
        connection_id,
        ClientMessage::Join {
            identity: Identity::from(identity),
            room_id: RoomId::from(room),
        },
    )
    .await
}

pub async fn send_disconnect(
    cmd_tx: &mpsc::Sender<SessionCommand>,
    connection_id: ConnectionId,
) -> Result<()> {
    cmd_tx
        .send(SessionCommand::Disconnect { connection_id })
        .await
        .context("coordinator is gone")
}

/// Skips signals until one addressed to `to` matches `pred`.
pub async fn wait_for_message<F>(
    signal_rx: &mut mpsc::UnboundedReceiver<Signal>,
    to: ConnectionId,
    pred: F,
) -> Result<ServerMessage>
where
    F: Fn(&ServerMessage) -> bool,
{
    wait_for_message_within(signal_rx, to, Duration::from_millis(SIGNAL_TIMEOUT_MS), pred).await
}

pub async fn wait_for_message_within<F>(
    signal_rx: &mut mpsc::UnboundedReceiver<Signal>,
    to: ConnectionId,
    timeout: Duration,
    pred: F,
) -> Result<ServerMessage>
where
    F: Fn(&ServerMessage) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let next = tokio::time::timeout_at(deadline, signal_rx.recv()).await;
        match next {
            Ok(Some(Signal::Sent { to: id, msg })) if id == to && pred(&msg) => return Ok(msg),
            Ok(Some(_)) => continue,
            Ok(None) => bail!("signal channel closed"),
            Err(_) => bail!("timed out waiting for a message to {:?}", to),
        }
    }
}

/// Joins `room` and waits for the `joined` reply.
pub async fn join_room(
    cmd_tx: &mpsc::Sender<SessionCommand>,
    signal_rx: &mut mpsc::UnboundedReceiver<Signal>,
    connection_id: ConnectionId,
    identity: &str,
    room: &str,
) -> Result<ServerMessage> {
    send_join(cmd_tx, connection_id, identity, room).await?;
    wait_for_message(signal_rx, connection_id, |m| {
        matches!(m, ServerMessage::Joined { .. })
    })
    .await
}

/// Round-trips a throwaway join through the coordinator so every command sent
/// before it has been fully handled.
pub async fn settle(
    cmd_tx: &mpsc::Sender<SessionCommand>,
    signal_rx: &mut mpsc::UnboundedReceiver<Signal>,
) -> Result<()> {
    let probe = ConnectionId::new();
    let room = format!("probe-{probe}");
    join_room(cmd_tx, signal_rx, probe, &room, &room).await?;
    send_disconnect(cmd_tx, probe).await
}
