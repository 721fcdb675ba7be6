use meshroom_core::{ClientMessage, ConnectionId, DenyReason, Identity, RoomId, ServerMessage};

use crate::integration::{create_test_coordinator, init_tracing};
use crate::utils::{join_room, send_join, send_message, settle, wait_for_message};

fn lock_r1() -> ClientMessage {
    ClientMessage::Lock {
        room_id: RoomId::from("r1"),
        desired: true,
    }
}

#[tokio::test]
async fn test_knock_denied() {
    init_tracing();

    let (cmd_tx, mut signal_rx, signaling) = create_test_coordinator();
    let a = ConnectionId::new();
    let c = ConnectionId::new();

    join_room(&cmd_tx, &mut signal_rx, a, "ann", "r1")
        .await
        .unwrap();
    send_message(&cmd_tx, a, lock_r1()).await.unwrap();

    send_join(&cmd_tx, c, "cat", "r1").await.unwrap();
    wait_for_message(&mut signal_rx, c, |m| *m == ServerMessage::Waiting)
        .await
        .expect("knocker waits");
    let knock = wait_for_message(&mut signal_rx, a, |m| {
        matches!(m, ServerMessage::Knock { .. })
    })
    .await
    .expect("host is asked");
    assert_eq!(
        knock,
        ServerMessage::Knock {
            identity: Identity::from("cat"),
            room_id: RoomId::from("r1"),
            requester_connection_id: c,
        }
    );

    send_message(
        &cmd_tx,
        a,
        ClientMessage::Deny {
            requester_connection_id: c,
            room_id: RoomId::from("r1"),
        },
    )
    .await
    .unwrap();
    wait_for_message(&mut signal_rx, c, |m| {
        *m == ServerMessage::Denied {
            room_id: RoomId::from("r1"),
            reason: DenyReason::HostDenied,
        }
    })
    .await
    .expect("knocker is turned away");

    settle(&cmd_tx, &mut signal_rx).await.unwrap();

    assert!(
        !signaling
            .sent_to(c)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::Joined { .. }))
    );
    assert!(
        !signaling
            .sent_to(a)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::MemberJoined { .. }))
    );
}

#[tokio::test]
async fn test_deny_of_admitted_member_has_no_effect() {
    init_tracing();

    let (cmd_tx, mut signal_rx, signaling) = create_test_coordinator();
    let a = ConnectionId::new();
    let b = ConnectionId::new();

    join_room(&cmd_tx, &mut signal_rx, a, "ann", "r1")
        .await
        .unwrap();
    join_room(&cmd_tx, &mut signal_rx, b, "bob", "r1")
        .await
        .unwrap();

    for _ in 0..2 {
        send_message(
            &cmd_tx,
            a,
            ClientMessage::Deny {
                requester_connection_id: b,
                room_id: RoomId::from("r1"),
            },
        )
        .await
        .unwrap();
    }

    settle(&cmd_tx, &mut signal_rx).await.unwrap();

    assert!(
        !signaling
            .sent_to(b)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::Denied { .. } | ServerMessage::MemberLeft { .. }))
    );
    assert!(
        !signaling
            .sent_to(a)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::Error { .. } | ServerMessage::MemberLeft { .. }))
    );
}
