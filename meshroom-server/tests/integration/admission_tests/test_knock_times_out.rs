use std::time::Duration;

use meshroom_core::{ClientMessage, ConnectionId, DenyReason, RoomId, ServerMessage};

use crate::integration::{create_test_coordinator_with_knock_timeout, init_tracing};
use crate::utils::{
    join_room, send_join, send_message, settle, wait_for_message, wait_for_message_within,
};

#[tokio::test(start_paused = true)]
async fn test_knock_times_out() {
    init_tracing();

    let (cmd_tx, mut signal_rx, signaling) =
        create_test_coordinator_with_knock_timeout(Duration::from_secs(30));
    let a = ConnectionId::new();
    let c = ConnectionId::new();

    join_room(&cmd_tx, &mut signal_rx, a, "ann", "r1")
        .await
        .unwrap();
    send_message(
        &cmd_tx,
        a,
        ClientMessage::Lock {
            room_id: RoomId::from("r1"),
            desired: true,
        },
    )
    .await
    .unwrap();
    send_join(&cmd_tx, c, "cat", "r1").await.unwrap();
    wait_for_message(&mut signal_rx, c, |m| *m == ServerMessage::Waiting)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    settle(&cmd_tx, &mut signal_rx).await.unwrap();
    assert!(
        !signaling
            .sent_to(c)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::Denied { .. }))
    );

    let denied = wait_for_message_within(&mut signal_rx, c, Duration::from_secs(60), |m| {
        matches!(m, ServerMessage::Denied { .. })
    })
    .await
    .expect("knock expires");
    assert_eq!(
        denied,
        ServerMessage::Denied {
            room_id: RoomId::from("r1"),
            reason: DenyReason::TimedOut,
        }
    );

    // The expired knock cannot be approved afterwards.
    send_message(
        &cmd_tx,
        a,
        ClientMessage::Approve {
            requester_connection_id: c,
            room_id: RoomId::from("r1"),
        },
    )
    .await
    .unwrap();
    wait_for_message(&mut signal_rx, a, |m| {
        matches!(m, ServerMessage::Error { .. })
    })
    .await
    .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_answered_knock_does_not_expire() {
    init_tracing();

    let (cmd_tx, mut signal_rx, signaling) =
        create_test_coordinator_with_knock_timeout(Duration::from_secs(30));
    let a = ConnectionId::new();
    let c = ConnectionId::new();

    join_room(&cmd_tx, &mut signal_rx, a, "ann", "r1")
        .await
        .unwrap();
    send_message(
        &cmd_tx,
        a,
        ClientMessage::Lock {
            room_id: RoomId::from("r1"),
            desired: true,
        },
    )
    .await
    .unwrap();
    send_join(&cmd_tx, c, "cat", "r1").await.unwrap();
    send_message(
        &cmd_tx,
        a,
        ClientMessage::Approve {
            requester_connection_id: c,
            room_id: RoomId::from("r1"),
        },
    )
    .await
    .unwrap();
    wait_for_message(&mut signal_rx, c, |m| {
        matches!(m, ServerMessage::Joined { .. })
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(45)).await;
    settle(&cmd_tx, &mut signal_rx).await.unwrap();

    assert!(
        !signaling
            .sent_to(c)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::Denied { .. }))
    );
}
