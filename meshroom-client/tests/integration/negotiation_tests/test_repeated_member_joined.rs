use anyhow::Result;
use meshroom_client::{
    ClientConfig, ClientEvent, NegotiationState, RoomClient, SignalingConnection,
};
use meshroom_core::{
    ClientMessage, ConnectionId, Identity, RoomId, ServerMessage, SessionDescription,
};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::integration::init_tracing;
use crate::utils::{EVENT_TIMEOUT, MockTransportFactory};

#[tokio::test]
async fn test_repeated_member_joined_keeps_stable_link() -> Result<()> {
    init_tracing();

    let factory = MockTransportFactory::default();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::channel(8);
    let (_handle, mut events, _) = RoomClient::start(
        ClientConfig::new("ws://test", Identity::from("ann"), RoomId::from("r1")),
        factory.clone(),
        SignalingConnection::from_channels(out_tx, in_rx),
    );

    let ben = ConnectionId::new();
    let ben_joined = ServerMessage::MemberJoined {
        identity: Identity::from("ben"),
        connection_id: ben,
    };
    in_tx
        .send(ServerMessage::Welcome { connection_id: ConnectionId::new() })
        .await?;
    in_tx.send(ben_joined.clone()).await?;

    tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(msg) = out_rx.recv().await {
            if matches!(msg, ClientMessage::Call { to, .. } if to == ben) {
                break;
            }
        }
    })
    .await?;

    in_tx
        .send(ServerMessage::CallAccepted {
            from: ben,
            answer: SessionDescription::answer("v=0 answer from ben"),
        })
        .await?;
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(evt) = events.recv().await {
            if matches!(evt, ClientEvent::LinkState { peer, state: NegotiationState::Stable } if peer == ben)
            {
                break;
            }
        }
    })
    .await?;

    // The same membership delta again must not touch the established link.
    in_tx.send(ben_joined).await?;
    in_tx
        .send(ServerMessage::RoomUpdate {
            total: 2,
            members: Vec::new(),
        })
        .await?;
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(evt) = events.recv().await {
            if matches!(evt, ClientEvent::Roster { .. }) {
                break;
            }
        }
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let late_offers = std::iter::from_fn(|| out_rx.try_recv().ok())
        .filter(|m| matches!(m, ClientMessage::Call { .. } | ClientMessage::Renegotiate { .. }))
        .count();
    assert_eq!(late_offers, 0);

    let states: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, ClientEvent::LinkState { .. }))
        .collect();
    assert!(states.is_empty(), "link state changed: {states:?}");
    assert_eq!(
        factory.ops().iter().filter(|op| *op == "create_offer").count(),
        1
    );

    Ok(())
}
