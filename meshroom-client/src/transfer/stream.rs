use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::link::DataChannel;
use crate::transfer::transfer_engine::{StreamJob, StreamReport};
use bytes::Bytes;
use meshroom_core::{BulkFrame, Record, TransferId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Pushes one requested file over the bulk channel, chunk by chunk.
///
/// Emission pauses whenever the channel's send buffer would grow past the
/// high-water mark and resumes once it drained to the low-water mark.
/// The outcome is always reported back, never returned.
pub async fn stream_file(
    channel: Arc<dyn DataChannel>,
    job: StreamJob,
    config: TransferConfig,
    reports: mpsc::UnboundedSender<StreamReport>,
) {
    let transfer_id = job.transfer_id;
    let report = match run(&channel, job, &config, &reports).await {
        Ok(()) => StreamReport::Finished { transfer_id },
        Err(error) => {
            debug!(%transfer_id, %error, "Stream stopped");
            StreamReport::Aborted { transfer_id, error }
        }
    };
    let _ = reports.send(report);
}

async fn run(
    channel: &Arc<dyn DataChannel>,
    job: StreamJob,
    config: &TransferConfig,
    reports: &mpsc::UnboundedSender<StreamReport>,
) -> Result<(), TransferError> {
    let StreamJob {
        transfer_id,
        data,
        mut cancel,
    } = job;
    let total = data.len();
    let mut offset = 0usize;
    let mut seq = 0u32;

    while offset < total {
        ensure_live(transfer_id, &cancel)?;

        let end = (offset + config.chunk_size).min(total);
        let frame = BulkFrame::Chunk {
            transfer_id,
            seq,
            data: data[offset..end].to_vec(),
        }
        .encode()?;

        wait_for_buffer_space(channel, frame.len(), config, transfer_id, &mut cancel).await?;
        send(channel, frame).await?;

        offset = end;
        seq += 1;
        let _ = reports.send(StreamReport::Progress {
            transfer_id,
            sent: offset as u64,
        });
    }

    // Chunks still buffered may be discarded if a cancel lands now.
    tokio::select! {
        res = channel.wait_buffered_low(0) => res.map_err(|_| TransferError::ChannelClosed)?,
        _ = cancel.changed() => {}
    }
    ensure_live(transfer_id, &cancel)?;

    send(channel, BulkFrame::Complete { transfer_id }.encode()?).await?;
    info!(%transfer_id, bytes = total, chunks = seq, "All chunks sent");
    Ok(())
}

fn ensure_live(transfer_id: TransferId, cancel: &watch::Receiver<bool>) -> Result<(), TransferError> {
    if *cancel.borrow() {
        return Err(TransferError::Cancelled(transfer_id));
    }
    Ok(())
}

async fn wait_for_buffer_space(
    channel: &Arc<dyn DataChannel>,
    next_frame: usize,
    config: &TransferConfig,
    transfer_id: TransferId,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), TransferError> {
    if !channel.is_open() {
        return Err(TransferError::ChannelClosed);
    }

    let buffered = channel.buffered_amount().await;
    if buffered + next_frame <= config.high_water_mark {
        return Ok(());
    }

    debug!(
        %transfer_id,
        channel = channel.label(),
        buffered,
        next_frame,
        high_water_mark = config.high_water_mark,
        "Applying backpressure"
    );

    tokio::select! {
        res = channel.wait_buffered_low(config.low_water_mark) => {
            res.map_err(|_| TransferError::ChannelClosed)
        }
        // A dropped sender means the engine is gone.
        _ = cancel.changed() => Err(TransferError::Cancelled(transfer_id)),
    }
}

async fn send(channel: &Arc<dyn DataChannel>, frame: Vec<u8>) -> Result<(), TransferError> {
    channel.send(Bytes::from(frame)).await.map_err(|e| {
        warn!(channel = channel.label(), error = %e, "Bulk send failed");
        TransferError::ChannelClosed
    })
}
