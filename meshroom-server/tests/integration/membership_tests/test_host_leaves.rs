use meshroom_core::{
    ClientMessage, ConnectionId, DenyReason, Identity, Role, RoomId, ServerMessage,
};

use crate::integration::{create_test_coordinator, init_tracing};
use crate::utils::{join_room, send_disconnect, send_join, send_message, wait_for_message};

#[tokio::test]
async fn test_host_leaves_guest_becomes_host() {
    init_tracing();

    let (cmd_tx, mut signal_rx, _signaling) = create_test_coordinator();
    let a = ConnectionId::new();
    let b = ConnectionId::new();
    let c = ConnectionId::new();

    join_room(&cmd_tx, &mut signal_rx, a, "ann", "r1")
        .await
        .unwrap();
    join_room(&cmd_tx, &mut signal_rx, b, "bob", "r1")
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
    wait_for_message(&mut signal_rx, b, |m| {
        *m == ServerMessage::Locked { state: true }
    })
    .await
    .expect("guest should see the lock");

    send_message(
        &cmd_tx,
        a,
        ClientMessage::Leave {
            room_id: RoomId::from("r1"),
        },
    )
    .await
    .unwrap();

    wait_for_message(&mut signal_rx, b, |m| {
        *m == ServerMessage::MemberLeft {
            connection_id: a,
            identity: Identity::from("ann"),
        }
    })
    .await
    .expect("bob should see ann leave");
    wait_for_message(&mut signal_rx, b, |m| {
        *m == ServerMessage::HostChanged {
            connection_id: b,
            identity: Identity::from("bob"),
        }
    })
    .await
    .expect("bob should become host");

    // Lock survives while bob remains.
    send_join(&cmd_tx, c, "cat", "r1").await.unwrap();
    wait_for_message(&mut signal_rx, c, |m| *m == ServerMessage::Waiting)
        .await
        .expect("room should still be locked");
    wait_for_message(&mut signal_rx, b, |m| {
        matches!(m, ServerMessage::Knock { requester_connection_id, .. } if *requester_connection_id == c)
    })
    .await
    .expect("new host receives the knock");

    // Last member gone: room and lock are discarded, the knock is turned away.
    send_disconnect(&cmd_tx, b).await.unwrap();
    wait_for_message(&mut signal_rx, c, |m| {
        *m == ServerMessage::Denied {
            room_id: RoomId::from("r1"),
            reason: DenyReason::RoomClosed,
        }
    })
    .await
    .expect("pending knock is denied when the room closes");

    let d = ConnectionId::new();
    let ServerMessage::Joined { role, locked, .. } =
        join_room(&cmd_tx, &mut signal_rx, d, "dan", "r1")
            .await
            .unwrap()
    else {
        unreachable!()
    };
    assert_eq!(role, Role::Host);
    assert!(!locked);
}

#[tokio::test]
async fn test_pending_knocks_move_to_new_host() {
    init_tracing();

    let (cmd_tx, mut signal_rx, _signaling) = create_test_coordinator();
    let a = ConnectionId::new();
    let b = ConnectionId::new();
    let c = ConnectionId::new();

    join_room(&cmd_tx, &mut signal_rx, a, "ann", "r1")
        .await
        .unwrap();
    join_room(&cmd_tx, &mut signal_rx, b, "bob", "r1")
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
    wait_for_message(&mut signal_rx, a, |m| {
        matches!(m, ServerMessage::Knock { .. })
    })
    .await
    .unwrap();

    send_disconnect(&cmd_tx, a).await.unwrap();

    let knock = wait_for_message(&mut signal_rx, b, |m| {
        matches!(m, ServerMessage::Knock { .. })
    })
    .await
    .expect("knock is re-sent to the new host");
    assert_eq!(
        knock,
        ServerMessage::Knock {
            identity: Identity::from("cat"),
            room_id: RoomId::from("r1"),
            requester_connection_id: c,
        }
    );
}
