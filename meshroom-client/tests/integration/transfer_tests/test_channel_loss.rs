use anyhow::Result;
use bytes::Bytes;
use meshroom_client::{Direction, TransferConfig, TransferEvent};
use std::sync::atomic::Ordering;

use crate::integration::init_tracing;
use crate::utils::linked_pair;

#[tokio::test]
async fn test_bulk_channel_loss_cancels_transfer() -> Result<()> {
    init_tracing();

    let (mut alice, mut bob) = linked_pair(TransferConfig::default()).await?;
    let transfer_id = alice
        .offer("big.bin", Bytes::from(vec![3u8; 8 * 1024 * 1024]))
        .await?;

    bob.wait_for_transfer(|t| matches!(t, TransferEvent::Offered { .. }))
        .await?;
    bob.accept(transfer_id).await?;
    bob.wait_for_transfer(|t| {
        matches!(
            t,
            TransferEvent::Progress { direction: Direction::Receive, percent, .. } if *percent >= 10
        )
    })
    .await?;

    alice.lose_bulk_channel().await?;
    bob.lose_bulk_channel().await?;

    let sent = alice
        .wait_for_transfer(|t| {
            matches!(
                t,
                TransferEvent::Cancelled { .. } | TransferEvent::Completed { .. } | TransferEvent::Failed { .. }
            )
        })
        .await?;
    assert!(matches!(sent, TransferEvent::Cancelled { direction: Direction::Send, .. }));

    let received = bob
        .wait_for_transfer(|t| {
            matches!(
                t,
                TransferEvent::Cancelled { .. } | TransferEvent::Completed { .. } | TransferEvent::Failed { .. }
            )
        })
        .await?;
    assert!(matches!(received, TransferEvent::Cancelled { direction: Direction::Receive, .. }));
    assert_eq!(alice.bulk.stats.complete_frames.load(Ordering::SeqCst), 0);

    Ok(())
}
