use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::transfer::outbound_library::{OutboundFile, OutboundLibrary};
use crate::transfer::transfer::{Direction, Transfer, TransferStatus};
use crate::transfer::transfer_event::TransferEvent;
use bytes::Bytes;
use meshroom_core::{BulkFrame, ConnectionId, TransferId};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Everything a stream task needs to push one file over the bulk channel.
#[derive(Debug)]
pub struct StreamJob {
    pub transfer_id: TransferId,
    pub data: Bytes,
    pub cancel: watch::Receiver<bool>,
}

/// Sent back by a stream task to the engine that spawned it.
#[derive(Debug)]
pub enum StreamReport {
    Progress { transfer_id: TransferId, sent: u64 },
    Finished { transfer_id: TransferId },
    Aborted {
        transfer_id: TransferId,
        error: TransferError,
    },
}

#[derive(Debug)]
pub enum EngineOutput {
    /// Put this frame on the bulk channel.
    Frame(BulkFrame),
    /// The peer requested a file; stream it.
    Stream(StreamJob),
}

/// File transfer bookkeeping for a single link.
///
/// Outbound transfers stream concurrently. Inbound transfers are taken one
/// at a time: accepting while another is in flight queues the request.
pub struct TransferEngine {
    peer: ConnectionId,
    config: TransferConfig,
    library: OutboundLibrary,
    outbound: HashMap<TransferId, Transfer>,
    inbound: HashMap<TransferId, Transfer>,
    active_inbound: Option<TransferId>,
    queued_requests: VecDeque<TransferId>,
    stream_cancels: HashMap<TransferId, watch::Sender<bool>>,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferEngine {
    pub fn new(
        peer: ConnectionId,
        config: TransferConfig,
        library: OutboundLibrary,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Self {
        Self {
            peer,
            config,
            library,
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            active_inbound: None,
            queued_requests: VecDeque::new(),
            stream_cancels: HashMap::new(),
            events,
        }
    }

    pub fn status(&self, transfer_id: &TransferId) -> Option<TransferStatus> {
        self.transfer(transfer_id).map(Transfer::status)
    }

    pub fn transfer(&self, transfer_id: &TransferId) -> Option<&Transfer> {
        self.outbound
            .get(transfer_id)
            .or_else(|| self.inbound.get(transfer_id))
    }

    pub fn active_inbound(&self) -> Option<TransferId> {
        self.active_inbound
    }

    /// Records the offer for this link and returns the frame announcing it.
    pub fn announce(&mut self, file: &OutboundFile) -> BulkFrame {
        self.outbound.entry(file.transfer_id).or_insert_with(|| {
            Transfer::new(
                file.transfer_id,
                Direction::Send,
                file.name.clone(),
                file.size(),
                self.config.chunk_size,
            )
        });
        file.offer_frame()
    }

    /// Accepts an offered file. Returns the request frame, or `None` when the
    /// request waits behind the inbound transfer already in flight.
    pub fn accept(&mut self, transfer_id: TransferId) -> Result<Option<BulkFrame>, TransferError> {
        let max = self.config.max_file_size;
        let transfer = self
            .inbound
            .get_mut(&transfer_id)
            .ok_or(TransferError::UnknownTransfer(transfer_id))?;

        if transfer.total_bytes() > max {
            return Err(TransferError::Oversized {
                size: transfer.total_bytes(),
                limit: max,
            });
        }
        transfer.transition(TransferStatus::Requested)?;

        if self.active_inbound.is_some() {
            info!(%transfer_id, "Inbound transfer busy, request queued");
            self.queued_requests.push_back(transfer_id);
            return Ok(None);
        }

        Ok(Some(self.send_request(transfer_id)))
    }

    /// Cancels locally. Cancelling a finished or already cancelled transfer
    /// does nothing.
    pub fn cancel(&mut self, transfer_id: TransferId) -> Result<Vec<BulkFrame>, TransferError> {
        if self.transfer(&transfer_id).is_none() {
            return Err(TransferError::UnknownTransfer(transfer_id));
        }
        if !self.mark_cancelled(transfer_id) {
            return Ok(Vec::new());
        }

        let mut frames = vec![BulkFrame::Cancel { transfer_id }];
        if self.active_inbound == Some(transfer_id) {
            frames.extend(self.advance_queue());
        }
        Ok(frames)
    }

    pub fn handle_frame(&mut self, frame: BulkFrame) -> Vec<EngineOutput> {
        match frame {
            BulkFrame::Offer {
                transfer_id,
                name,
                size,
            } => {
                self.on_offer(transfer_id, name, size);
                Vec::new()
            }
            BulkFrame::Request { transfer_id } => self.on_request(transfer_id),
            BulkFrame::Cancel { transfer_id } => self.on_remote_cancel(transfer_id),
            BulkFrame::Complete { transfer_id } => self.on_complete(transfer_id),
            BulkFrame::Chunk {
                transfer_id,
                seq,
                data,
            } => self.on_chunk(transfer_id, seq, &data),
        }
    }

    pub fn on_stream_report(&mut self, report: StreamReport) {
        match report {
            StreamReport::Progress { transfer_id, sent } => {
                let Some(transfer) = self.outbound.get_mut(&transfer_id) else {
                    return;
                };
                if transfer.status() != TransferStatus::Active {
                    return;
                }
                let before = transfer.percent();
                transfer.record_sent(sent);
                let percent = transfer.percent();
                if percent != before {
                    self.emit(TransferEvent::Progress {
                        peer: self.peer,
                        transfer_id,
                        direction: Direction::Send,
                        percent,
                    });
                }
            }

            StreamReport::Finished { transfer_id } => {
                self.stream_cancels.remove(&transfer_id);
                let Some(transfer) = self.outbound.get_mut(&transfer_id) else {
                    return;
                };
                if transfer.transition(TransferStatus::Completed).is_ok() {
                    info!(%transfer_id, peer = ?self.peer, "Upload complete");
                    let name = transfer.name.clone();
                    self.emit(TransferEvent::Completed {
                        peer: self.peer,
                        transfer_id,
                        direction: Direction::Send,
                        name,
                        data: None,
                    });
                }
            }

            StreamReport::Aborted { transfer_id, error } => {
                self.stream_cancels.remove(&transfer_id);
                match error {
                    TransferError::Cancelled(_) | TransferError::ChannelClosed => {
                        self.mark_cancelled(transfer_id);
                    }
                    other => self.mark_failed(transfer_id, Direction::Send, &other),
                }
            }
        }
    }

    /// The bulk channel went away: every transfer in flight is cancelled.
    pub fn channel_lost(&mut self) {
        let in_flight: Vec<TransferId> = self
            .outbound
            .values()
            .chain(self.inbound.values())
            .filter(|t| {
                matches!(
                    t.status(),
                    TransferStatus::Requested | TransferStatus::Active
                )
            })
            .map(|t| t.transfer_id)
            .collect();

        if !in_flight.is_empty() {
            warn!(
                peer = ?self.peer,
                count = in_flight.len(),
                "Bulk channel lost mid-transfer"
            );
        }
        for transfer_id in in_flight {
            self.mark_cancelled(transfer_id);
        }
        self.active_inbound = None;
        self.queued_requests.clear();
    }

    fn on_offer(&mut self, transfer_id: TransferId, name: String, size: u64) {
        if self.inbound.contains_key(&transfer_id) {
            debug!(%transfer_id, "Duplicate offer ignored");
            return;
        }

        info!(%transfer_id, peer = ?self.peer, %name, size, "File offered");
        self.inbound.insert(
            transfer_id,
            Transfer::new(
                transfer_id,
                Direction::Receive,
                name.clone(),
                size,
                self.config.chunk_size,
            ),
        );
        self.emit(TransferEvent::Offered {
            peer: self.peer,
            transfer_id,
            name,
            size,
        });
    }

    fn on_request(&mut self, transfer_id: TransferId) -> Vec<EngineOutput> {
        let file = self.library.get(&transfer_id);
        let Some(transfer) = self.outbound.get_mut(&transfer_id) else {
            warn!(%transfer_id, "Request for a file never offered on this link");
            return vec![EngineOutput::Frame(BulkFrame::Cancel { transfer_id })];
        };
        if transfer.status() != TransferStatus::Offered {
            debug!(%transfer_id, status = transfer.status().name(), "Repeated request ignored");
            return Vec::new();
        }
        let Some(file) = file else {
            warn!(%transfer_id, "Requested file is no longer available");
            self.mark_cancelled(transfer_id);
            return vec![EngineOutput::Frame(BulkFrame::Cancel { transfer_id })];
        };

        if transfer.transition(TransferStatus::Requested).is_err()
            || transfer.transition(TransferStatus::Active).is_err()
        {
            return Vec::new();
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.stream_cancels.insert(transfer_id, cancel_tx);
        info!(%transfer_id, peer = ?self.peer, size = file.size(), "Streaming file");

        vec![EngineOutput::Stream(StreamJob {
            transfer_id,
            data: file.data,
            cancel: cancel_rx,
        })]
    }

    fn on_remote_cancel(&mut self, transfer_id: TransferId) -> Vec<EngineOutput> {
        if !self.mark_cancelled(transfer_id) {
            return Vec::new();
        }
        info!(%transfer_id, peer = ?self.peer, "Peer cancelled transfer");

        if self.active_inbound == Some(transfer_id) {
            return self
                .advance_queue()
                .into_iter()
                .map(EngineOutput::Frame)
                .collect();
        }
        Vec::new()
    }

    fn on_complete(&mut self, transfer_id: TransferId) -> Vec<EngineOutput> {
        if self.active_inbound != Some(transfer_id) {
            debug!(%transfer_id, "Completion for inactive transfer ignored");
            return Vec::new();
        }
        let Some(transfer) = self.inbound.get_mut(&transfer_id) else {
            return Vec::new();
        };

        match transfer.finalize() {
            Ok(data) => {
                info!(%transfer_id, peer = ?self.peer, bytes = data.len(), "Download complete");
                let name = transfer.name.clone();
                self.emit(TransferEvent::Completed {
                    peer: self.peer,
                    transfer_id,
                    direction: Direction::Receive,
                    name,
                    data: Some(Bytes::from(data)),
                });
            }
            Err(e) => self.mark_failed(transfer_id, Direction::Receive, &e),
        }

        self.advance_queue()
            .into_iter()
            .map(EngineOutput::Frame)
            .collect()
    }

    fn on_chunk(&mut self, transfer_id: TransferId, seq: u32, data: &[u8]) -> Vec<EngineOutput> {
        // Only the requested transfer holding the inbound slot may grow a buffer.
        if self.active_inbound != Some(transfer_id) {
            debug!(%transfer_id, "Chunk for a transfer not being received dropped");
            return Vec::new();
        }
        let Some(transfer) = self.inbound.get_mut(&transfer_id) else {
            debug!(%transfer_id, "Chunk for unknown transfer dropped");
            return Vec::new();
        };
        if transfer.status().is_terminal() {
            return Vec::new();
        }
        if transfer.status() == TransferStatus::Requested
            && transfer.transition(TransferStatus::Active).is_err()
        {
            return Vec::new();
        }

        let before = transfer.percent();
        if let Err(e) = transfer.append_chunk(seq, data) {
            self.mark_failed(transfer_id, Direction::Receive, &e);
            let mut out = vec![EngineOutput::Frame(BulkFrame::Cancel { transfer_id })];
            out.extend(self.advance_queue().map(EngineOutput::Frame));
            return out;
        }

        let percent = transfer.percent();
        if percent != before {
            self.emit(TransferEvent::Progress {
                peer: self.peer,
                transfer_id,
                direction: Direction::Receive,
                percent,
            });
        }
        Vec::new()
    }

    fn send_request(&mut self, transfer_id: TransferId) -> BulkFrame {
        if let Some(transfer) = self.inbound.get_mut(&transfer_id) {
            transfer.allocate_buffer();
        }
        self.active_inbound = Some(transfer_id);
        debug!(%transfer_id, "Requesting file");
        BulkFrame::Request { transfer_id }
    }

    /// Frees the inbound slot and requests the next queued file, if any.
    fn advance_queue(&mut self) -> Option<BulkFrame> {
        self.active_inbound = None;

        while let Some(next) = self.queued_requests.pop_front() {
            let waiting = self
                .inbound
                .get(&next)
                .is_some_and(|t| t.status() == TransferStatus::Requested);
            if waiting {
                return Some(self.send_request(next));
            }
        }
        None
    }

    /// Returns `false` when the transfer was unknown or already terminal.
    fn mark_cancelled(&mut self, transfer_id: TransferId) -> bool {
        let transfer = match self.outbound.get_mut(&transfer_id) {
            Some(t) => t,
            None => match self.inbound.get_mut(&transfer_id) {
                Some(t) => t,
                None => return false,
            },
        };
        if transfer.transition(TransferStatus::Cancelled).is_err() {
            return false;
        }
        let direction = transfer.direction;

        if let Some(cancel) = self.stream_cancels.remove(&transfer_id) {
            let _ = cancel.send(true);
        }
        self.queued_requests.retain(|id| *id != transfer_id);

        info!(%transfer_id, peer = ?self.peer, "Transfer cancelled");
        self.emit(TransferEvent::Cancelled {
            peer: self.peer,
            transfer_id,
            direction,
        });
        true
    }

    fn mark_failed(&mut self, transfer_id: TransferId, direction: Direction, error: &TransferError) {
        let map = match direction {
            Direction::Send => &mut self.outbound,
            Direction::Receive => &mut self.inbound,
        };
        let Some(transfer) = map.get_mut(&transfer_id) else {
            return;
        };
        if transfer.transition(TransferStatus::Failed).is_err() {
            return;
        }

        if let Some(cancel) = self.stream_cancels.remove(&transfer_id) {
            let _ = cancel.send(true);
        }
        warn!(%transfer_id, peer = ?self.peer, %error, "Transfer failed");
        self.emit(TransferEvent::Failed {
            peer: self.peer,
            transfer_id,
            direction,
            reason: error.to_string(),
        });
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }
}
