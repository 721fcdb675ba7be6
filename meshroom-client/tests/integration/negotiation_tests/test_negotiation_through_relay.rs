use anyhow::Result;
use meshroom_client::{
    ClientConfig, ClientEvent, NegotiationState, RoomClient, SignalingConnection,
};
use meshroom_core::{ClientMessage, ConnectionId, Identity, RoomId, ServerMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::integration::init_tracing;
use crate::utils::{EVENT_TIMEOUT, MockTransportFactory, spawn_relay};

async fn wait_for_stable(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    peer: ConnectionId,
) -> Result<()> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(evt) = events.recv().await {
            if matches!(evt, ClientEvent::LinkState { peer: p, state: NegotiationState::Stable } if p == peer)
            {
                return Ok(());
            }
        }
        anyhow::bail!("event channel closed")
    })
    .await?
}

#[tokio::test]
async fn test_existing_member_calls_newcomer() -> Result<()> {
    init_tracing();

    let factory = MockTransportFactory::default();
    let ann_id = ConnectionId::new();
    let ben_id = ConnectionId::new();
    let room = RoomId::from("r1");

    let (ann_out_tx, ann_out_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (ann_in_tx, ann_in_rx) = mpsc::channel::<ServerMessage>(64);
    let (ben_out_tx, ben_out_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (ben_in_tx, ben_in_rx) = mpsc::channel::<ServerMessage>(64);

    let (_ann, mut ann_events, _) = RoomClient::start(
        ClientConfig::new("ws://test", Identity::from("ann"), room.clone()),
        factory.clone(),
        SignalingConnection::from_channels(ann_out_tx, ann_in_rx),
    );
    let (_ben, mut ben_events, _) = RoomClient::start(
        ClientConfig::new("ws://test", Identity::from("ben"), room),
        factory.clone(),
        SignalingConnection::from_channels(ben_out_tx, ben_in_rx),
    );

    spawn_relay(
        ann_id,
        Identity::from("ann"),
        ann_out_rx,
        HashMap::from([(ben_id, ben_in_tx.clone())]),
    );
    spawn_relay(
        ben_id,
        Identity::from("ben"),
        ben_out_rx,
        HashMap::from([(ann_id, ann_in_tx.clone())]),
    );

    ann_in_tx.send(ServerMessage::Welcome { connection_id: ann_id }).await?;
    ben_in_tx.send(ServerMessage::Welcome { connection_id: ben_id }).await?;

    // Ann is already in the room and hears about Ben; Ben only answers.
    ann_in_tx
        .send(ServerMessage::MemberJoined {
            identity: Identity::from("ben"),
            connection_id: ben_id,
        })
        .await?;

    wait_for_stable(&mut ann_events, ben_id).await?;
    wait_for_stable(&mut ben_events, ann_id).await?;

    let ops = factory.ops();
    assert_eq!(ops.iter().filter(|op| *op == "create_offer").count(), 1);
    assert_eq!(ops.iter().filter(|op| *op == "create_answer").count(), 1);
    assert_eq!(ops.iter().filter(|op| *op == "set_remote").count(), 2);
    assert!(ops.iter().any(|op| op.starts_with("candidate ")));

    Ok(())
}

#[tokio::test]
async fn test_welcome_sends_join() -> Result<()> {
    init_tracing();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::channel(8);
    let (_handle, mut events, _) = RoomClient::start(
        ClientConfig::new("ws://test", Identity::from("ann"), RoomId::from("r1")),
        MockTransportFactory::default(),
        SignalingConnection::from_channels(out_tx, in_rx),
    );

    let me = ConnectionId::new();
    in_tx.send(ServerMessage::Welcome { connection_id: me }).await?;

    let join = tokio::time::timeout(EVENT_TIMEOUT, out_rx.recv()).await?;
    assert_eq!(
        join,
        Some(ClientMessage::Join {
            identity: Identity::from("ann"),
            room_id: RoomId::from("r1"),
        })
    );
    let connected = tokio::time::timeout(EVENT_TIMEOUT, events.recv()).await?;
    assert_eq!(connected, Some(ClientEvent::Connected { connection_id: me }));

    // Our own membership echo never opens a link to ourselves.
    in_tx
        .send(ServerMessage::MemberJoined {
            identity: Identity::from("ann"),
            connection_id: me,
        })
        .await?;
    drop(in_tx);

    while let Some(msg) = tokio::time::timeout(EVENT_TIMEOUT, out_rx.recv()).await? {
        assert!(!matches!(msg, ClientMessage::Call { .. }));
    }

    Ok(())
}
