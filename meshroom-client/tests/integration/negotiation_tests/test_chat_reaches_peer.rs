use anyhow::Result;
use meshroom_client::{ClientEvent, TransferConfig};

use crate::integration::init_tracing;
use crate::utils::linked_pair;

#[tokio::test]
async fn test_chat_reaches_peer() -> Result<()> {
    init_tracing();

    let (alice, mut bob) = linked_pair(TransferConfig::default()).await?;
    alice.chat("hello over the control channel").await;
    alice.chat("second line").await;

    let first = bob
        .wait_for_event(|e| matches!(e, ClientEvent::Chat { .. }))
        .await?;
    let ClientEvent::Chat { from, text, sent_at } = first else {
        unreachable!()
    };
    assert_eq!(from, alice.id);
    assert_eq!(text, "hello over the control channel");
    assert!(sent_at > 0);

    let second = bob
        .wait_for_event(|e| matches!(e, ClientEvent::Chat { .. }))
        .await?;
    assert!(matches!(second, ClientEvent::Chat { text, .. } if text == "second line"));

    Ok(())
}
