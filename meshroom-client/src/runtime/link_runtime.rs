use crate::config::TransferConfig;
use crate::error::{LinkError, TransferError};
use crate::link::{NegotiationState, PeerLink, SessionTransport, TransportEvent};
use crate::runtime::client_event::ClientEvent;
use crate::runtime::link_command::LinkCommand;
use crate::transfer::{
    EngineOutput, OutboundLibrary, StreamJob, StreamReport, TransferEngine, TransferEvent,
    stream_file,
};
use bytes::Bytes;
use meshroom_core::{BulkFrame, Channel, ClientMessage, ConnectionId, ControlRecord, Record};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Fresh offers the calling side makes after a failed attempt before giving up.
pub const MAX_OFFER_RETRIES: u32 = 3;

const COMMAND_BUFFER: usize = 64;

/// What every link of a room shares.
#[derive(Clone)]
pub struct LinkContext {
    pub library: OutboundLibrary,
    pub transfer: TransferConfig,
    pub signaling: mpsc::UnboundedSender<ClientMessage>,
    pub events: mpsc::UnboundedSender<ClientEvent>,
}

/// Owner side of a running link.
pub struct LinkHandle {
    commands: mpsc::Sender<LinkCommand>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    /// Returns `false` once the link's loop has ended.
    pub async fn send(&self, cmd: LinkCommand) -> bool {
        self.commands.send(cmd).await.is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Closes the link and waits for its loop to wind down.
    pub async fn close(self) {
        let _ = self.commands.send(LinkCommand::Close).await;
        let _ = self.task.await;
    }
}

pub fn spawn_link<T: SessionTransport>(
    link: PeerLink<T>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    ctx: &LinkContext,
) -> LinkHandle {
    let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let runtime = LinkRuntime::new(link, command_rx, transport_rx, ctx);
    LinkHandle {
        commands,
        task: tokio::spawn(runtime.run()),
    }
}

/// Event loop for one remote participant: negotiation, channels, transfers.
pub struct LinkRuntime<T: SessionTransport> {
    link: PeerLink<T>,
    engine: TransferEngine,
    transfer_config: TransferConfig,
    command_rx: mpsc::Receiver<LinkCommand>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    transfer_rx: mpsc::UnboundedReceiver<TransferEvent>,
    report_tx: mpsc::UnboundedSender<StreamReport>,
    report_rx: mpsc::UnboundedReceiver<StreamReport>,
    signaling: mpsc::UnboundedSender<ClientMessage>,
    events: mpsc::UnboundedSender<ClientEvent>,
    streams: JoinSet<()>,
    /// Records written before their channel opened.
    outbox: Vec<(Channel, Bytes)>,
    offerer: bool,
    retries: u32,
    last_state: NegotiationState,
}

impl<T: SessionTransport> LinkRuntime<T> {
    pub fn new(
        link: PeerLink<T>,
        command_rx: mpsc::Receiver<LinkCommand>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        ctx: &LinkContext,
    ) -> Self {
        let (transfer_tx, transfer_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let engine = TransferEngine::new(
            link.remote(),
            ctx.transfer.clone(),
            ctx.library.clone(),
            transfer_tx,
        );
        let last_state = link.state();

        Self {
            link,
            engine,
            transfer_config: ctx.transfer.clone(),
            command_rx,
            transport_rx,
            transfer_rx,
            report_tx,
            report_rx,
            signaling: ctx.signaling.clone(),
            events: ctx.events.clone(),
            streams: JoinSet::new(),
            outbox: Vec::new(),
            offerer: false,
            retries: 0,
            last_state,
        }
    }

    fn remote(&self) -> ConnectionId {
        self.link.remote()
    }

    pub async fn run(mut self) {
        info!("Link loop for {:?} started", self.remote());

        loop {
            let deadline = self.link.deadline();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(LinkCommand::Close) | None => break,
                        Some(c) => self.handle_command(c).await,
                    }
                }

                evt = self.transport_rx.recv() => {
                    match evt {
                        Some(TransportEvent::Disconnected) | None => {
                            info!("Transport to {:?} went away", self.remote());
                            break;
                        }
                        Some(e) => self.handle_transport_event(e).await,
                    }
                }

                Some(evt) = self.transfer_rx.recv() => {
                    let _ = self.events.send(ClientEvent::Transfer(evt));
                }

                Some(report) = self.report_rx.recv() => {
                    self.engine.on_stream_report(report);
                }

                epoch = deadline_elapsed(deadline) => {
                    if self.link.expire(epoch) {
                        self.retry_offer().await;
                    }
                }

                Some(_) = self.streams.join_next(), if !self.streams.is_empty() => {}
            }

            self.publish_state();
        }

        self.shutdown().await;
        info!("Link loop for {:?} finished", self.remote());
    }

    async fn handle_command(&mut self, cmd: LinkCommand) {
        match cmd {
            LinkCommand::StartOffer => {
                self.offerer = true;
                self.retries = 0;
                self.offer().await;
            }

            LinkCommand::RemoteOffer { offer, kind } => {
                match self.link.handle_remote_offer(offer, kind).await {
                    Ok(answer) => self.signal(answer),
                    Err(LinkError::Closed) => {}
                    Err(_) => self.retry_offer().await,
                }
            }

            LinkCommand::RemoteAnswer(answer) => {
                match self.link.handle_remote_answer(answer).await {
                    Ok(()) | Err(LinkError::Closed) => {}
                    Err(_) => self.retry_offer().await,
                }
            }

            LinkCommand::RemoteCandidate(candidate) => {
                let _ = self.link.add_remote_candidate(candidate).await;
            }

            LinkCommand::SendChat(text) => {
                let record = ControlRecord::Chat {
                    text,
                    sent_at: now_millis(),
                };
                self.send_record(&record).await;
            }

            LinkCommand::OfferFile(file) => {
                let frame = self.engine.announce(&file);
                self.send_record(&frame).await;
            }

            LinkCommand::AcceptTransfer { transfer_id, reply } => {
                let result = match self.engine.accept(transfer_id) {
                    Ok(Some(request)) => {
                        self.send_record(&request).await;
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            LinkCommand::CancelTransfer(transfer_id) => match self.engine.cancel(transfer_id) {
                Ok(frames) => {
                    for frame in frames {
                        self.send_record(&frame).await;
                    }
                }
                Err(TransferError::UnknownTransfer(_)) => {
                    debug!("{:?} knows no transfer {}", self.remote(), transfer_id);
                }
                Err(e) => warn!("Cancel of {} failed: {}", transfer_id, e),
            },

            LinkCommand::Close => {}
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if let Some(msg) = self.link.local_candidate(candidate) {
                    self.signal(msg);
                }
            }

            TransportEvent::ChannelOpen(channel, dc) => {
                self.link.attach_channel(channel, dc);
                self.flush_outbox(channel).await;

                let ready = Channel::ALL.iter().all(|c| self.link.channel(*c).is_some());
                if ready {
                    info!("Channels to {:?} are open", self.remote());
                    let _ = self.events.send(ClientEvent::LinkReady {
                        peer: self.remote(),
                    });
                }
            }

            TransportEvent::Message(Channel::Control, data) => self.handle_control(&data).await,

            TransportEvent::Message(Channel::Bulk, data) => self.handle_bulk(&data).await,

            TransportEvent::ChannelClosed(channel) => {
                warn!("{:?} channel to {:?} closed", channel, self.remote());
                self.link.detach_channel(channel);
                if channel == Channel::Bulk {
                    self.engine.channel_lost();
                }
            }

            TransportEvent::Disconnected => {}
        }
    }

    async fn handle_control(&mut self, data: &[u8]) {
        match ControlRecord::decode(data) {
            Ok(ControlRecord::Chat { text, sent_at }) => {
                let _ = self.events.send(ClientEvent::Chat {
                    from: self.remote(),
                    text,
                    sent_at,
                });
            }
            Ok(ControlRecord::Ping { timestamp }) => {
                self.send_record(&ControlRecord::Pong { timestamp }).await;
            }
            Ok(ControlRecord::Pong { timestamp }) => {
                debug!(
                    "Pong from {:?} after {}ms",
                    self.remote(),
                    now_millis().saturating_sub(timestamp)
                );
            }
            Err(e) => warn!("Dropping malformed control record from {:?}: {}", self.remote(), e),
        }
    }

    async fn handle_bulk(&mut self, data: &[u8]) {
        let frame = match BulkFrame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed bulk frame from {:?}: {}", self.remote(), e);
                return;
            }
        };

        for output in self.engine.handle_frame(frame) {
            match output {
                EngineOutput::Frame(frame) => self.send_record(&frame).await,
                EngineOutput::Stream(job) => self.start_stream(job),
            }
        }
    }

    fn start_stream(&mut self, job: StreamJob) {
        let Some(channel) = self.link.channel(Channel::Bulk) else {
            self.engine.on_stream_report(StreamReport::Aborted {
                transfer_id: job.transfer_id,
                error: TransferError::ChannelClosed,
            });
            return;
        };

        self.streams.spawn(stream_file(
            channel,
            job,
            self.transfer_config.clone(),
            self.report_tx.clone(),
        ));
    }

    async fn send_record<R: Record>(&mut self, record: &R) {
        let channel = record.channel();
        let bytes = match record.encode() {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                error!("Failed to encode {:?} record: {}", channel, e);
                return;
            }
        };

        match self.link.channel(channel) {
            Some(dc) if dc.is_open() => {
                if let Err(e) = dc.send(bytes).await {
                    warn!("Send on {:?} to {:?} failed: {}", channel, self.remote(), e);
                }
            }
            _ => {
                debug!("{:?} channel to {:?} not open, queueing", channel, self.remote());
                self.outbox.push((channel, bytes));
            }
        }
    }

    async fn flush_outbox(&mut self, channel: Channel) {
        let Some(dc) = self.link.channel(channel) else {
            return;
        };
        let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outbox)
            .into_iter()
            .partition(|(c, _)| *c == channel);
        self.outbox = rest;

        for (_, bytes) in ready {
            if let Err(e) = dc.send(bytes).await {
                warn!("Queued send on {:?} failed: {}", channel, e);
            }
        }
    }

    async fn offer(&mut self) {
        loop {
            match self.link.start_offer().await {
                Ok(msg) => return self.signal(msg),
                Err(LinkError::OfferInProgress | LinkError::Closed) => return,
                Err(_) if self.take_retry() => continue,
                Err(_) => return,
            }
        }
    }

    /// The calling side re-offers after a failure; the answering side waits.
    async fn retry_offer(&mut self) {
        if self.take_retry() {
            self.offer().await;
        }
    }

    fn take_retry(&mut self) -> bool {
        if !self.offerer {
            return false;
        }
        if self.retries >= MAX_OFFER_RETRIES {
            error!(
                "Giving up on {:?} after {} attempts",
                self.remote(),
                self.retries + 1
            );
            return false;
        }

        self.retries += 1;
        info!(attempt = self.retries, "Re-offering to {:?}", self.remote());
        true
    }

    fn publish_state(&mut self) {
        let state = self.link.state();
        if state == self.last_state {
            return;
        }

        self.last_state = state;
        if state == NegotiationState::Stable {
            self.retries = 0;
        }
        let _ = self.events.send(ClientEvent::LinkState {
            peer: self.remote(),
            state,
        });
    }

    async fn shutdown(&mut self) {
        self.engine.channel_lost();
        while let Ok(evt) = self.transfer_rx.try_recv() {
            let _ = self.events.send(ClientEvent::Transfer(evt));
        }

        self.streams.abort_all();
        self.link.close().await;
        self.publish_state();
        let _ = self.events.send(ClientEvent::LinkClosed {
            peer: self.remote(),
        });
    }

    fn signal(&self, msg: ClientMessage) {
        let _ = self.signaling.send(msg);
    }
}

async fn deadline_elapsed(deadline: Option<(u64, Instant)>) -> u64 {
    match deadline {
        Some((epoch, at)) => {
            tokio::time::sleep_until(at).await;
            epoch
        }
        None => std::future::pending().await,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
