use anyhow::Result;
use bytes::Bytes;
use meshroom_client::{ClientEvent, TransferConfig, TransferError};
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::integration::init_tracing;
use crate::utils::linked_pair;

#[tokio::test]
async fn test_oversized_offer_is_rejected_locally() -> Result<()> {
    init_tracing();

    let config = TransferConfig {
        max_file_size: 64 * 1024,
        ..TransferConfig::default()
    };
    let (alice, mut bob) = linked_pair(config).await?;

    let err = alice
        .offer("huge.bin", Bytes::from(vec![0u8; 64 * 1024 + 1]))
        .await
        .expect_err("offer over the ceiling should fail");
    assert!(matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::Oversized { .. })
    ));
    assert!(alice.library.is_empty());

    // Exactly at the ceiling is fine.
    alice
        .offer("edge.bin", Bytes::from(vec![0u8; 64 * 1024]))
        .await?;
    assert_eq!(alice.library.len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let offers = bob
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, ClientEvent::Transfer(_)))
        .count();
    assert_eq!(offers, 1);
    assert_eq!(alice.bulk.stats.complete_frames.load(Ordering::SeqCst), 0);

    Ok(())
}
