use crate::config::ClientConfig;
use crate::error::TransferError;
use crate::link::{OfferKind, PeerLink, TransportFactory};
use crate::runtime::client_event::ClientEvent;
use crate::runtime::link_command::LinkCommand;
use crate::runtime::link_runtime::{LinkContext, LinkHandle, spawn_link};
use crate::runtime::room_command::RoomCommand;
use crate::runtime::signaling_client::SignalingConnection;
use crate::transfer::OutboundLibrary;
use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use meshroom_core::{
    ClientMessage, ConnectionId, IceServerConfig, RoomId, ServerMessage, TransferId,
};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 64;
const TRANSPORT_BUFFER: usize = 256;

/// Cloneable front door to a running [`RoomClient`].
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn chat(&self, text: impl Into<String>) -> Result<()> {
        self.send(RoomCommand::Chat(text.into())).await
    }

    pub async fn offer_file(&self, name: impl Into<String>, data: impl Into<Bytes>) -> Result<TransferId> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::OfferFile {
            name: name.into(),
            data: data.into(),
            reply,
        })
        .await?;
        Ok(rx.await.context("Room client stopped")??)
    }

    pub async fn accept(&self, peer: ConnectionId, transfer_id: TransferId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::AcceptTransfer {
            peer,
            transfer_id,
            reply,
        })
        .await?;
        Ok(rx.await.context("Link closed before the transfer was accepted")??)
    }

    pub async fn cancel(&self, transfer_id: TransferId) -> Result<()> {
        self.send(RoomCommand::CancelTransfer(transfer_id)).await
    }

    pub async fn lock(&self, desired: bool) -> Result<()> {
        self.send(RoomCommand::Lock(desired)).await
    }

    pub async fn kick(&self, target: ConnectionId) -> Result<()> {
        self.send(RoomCommand::Kick(target)).await
    }

    pub async fn approve(&self, requester: ConnectionId) -> Result<()> {
        self.send(RoomCommand::Approve(requester)).await
    }

    pub async fn deny(&self, requester: ConnectionId) -> Result<()> {
        self.send(RoomCommand::Deny(requester)).await
    }

    pub async fn leave(&self) -> Result<()> {
        self.send(RoomCommand::Leave).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| anyhow!("Room client stopped"))
    }
}

/// Client side of one room: follows the server's membership events and
/// keeps one link per remote participant.
///
/// Existing members call newcomers; a newcomer answers the calls it gets.
pub struct RoomClient<F: TransportFactory> {
    config: ClientConfig,
    factory: F,
    ctx: LinkContext,
    ice_servers: Vec<IceServerConfig>,
    connection_id: Option<ConnectionId>,
    room: Option<RoomId>,
    links: HashMap<ConnectionId, LinkHandle>,
    server_rx: mpsc::Receiver<ServerMessage>,
    command_rx: mpsc::Receiver<RoomCommand>,
}

impl<F: TransportFactory> RoomClient<F> {
    /// Spawns the room loop. Events for the UI arrive on the returned receiver.
    pub fn start(
        config: ClientConfig,
        factory: F,
        signaling: SignalingConnection,
    ) -> (RoomHandle, mpsc::UnboundedReceiver<ClientEvent>, JoinHandle<()>) {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ctx = LinkContext {
            library: OutboundLibrary::new(config.transfer.max_file_size),
            transfer: config.transfer.clone(),
            signaling: signaling.outgoing,
            events: events_tx,
        };
        let client = Self {
            ice_servers: config.ice_servers.clone(),
            config,
            factory,
            ctx,
            connection_id: None,
            room: None,
            links: HashMap::new(),
            server_rx: signaling.incoming,
            command_rx,
        };

        let task = tokio::spawn(client.run());
        (RoomHandle { commands }, events_rx, task)
    }

    async fn run(mut self) {
        info!("Room client for {} started", self.config.identity);

        loop {
            tokio::select! {
                msg = self.server_rx.recv() => {
                    match msg {
                        Some(m) => self.handle_server_message(m).await,
                        None => {
                            warn!("Signaling connection lost");
                            self.emit(ClientEvent::Disconnected);
                            break;
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(RoomCommand::Leave) | None => {
                            self.leave();
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                    }
                }
            }
        }

        self.close_links().await;
        info!("Room client finished");
    }

    async fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { connection_id } => {
                info!("Connected as {:?}", connection_id);
                self.connection_id = Some(connection_id);
                self.emit(ClientEvent::Connected { connection_id });
                self.signal(ClientMessage::Join {
                    identity: self.config.identity.clone(),
                    room_id: self.config.room.clone(),
                });
            }

            ServerMessage::IceConfig { ice_servers } => {
                if !ice_servers.is_empty() {
                    debug!("Using {} ICE servers from the server", ice_servers.len());
                    self.ice_servers = ice_servers;
                }
            }

            ServerMessage::Joined {
                room_id,
                existing_members,
                role,
                locked,
                ..
            } => {
                info!("Joined room {} as {:?}", room_id, role);
                self.room = Some(room_id.clone());
                self.emit(ClientEvent::Joined {
                    room_id,
                    role,
                    locked,
                    existing_members,
                });
            }

            ServerMessage::MemberJoined {
                identity,
                connection_id,
            } => {
                self.emit(ClientEvent::MemberJoined {
                    connection_id,
                    identity,
                });
                let linked = self
                    .links
                    .get(&connection_id)
                    .is_some_and(|link| !link.is_finished());
                if linked {
                    debug!("Already linked to {:?}, repeated join ignored", connection_id);
                } else if Some(connection_id) != self.connection_id {
                    self.forward(connection_id, LinkCommand::StartOffer, true)
                        .await;
                }
            }

            ServerMessage::MemberLeft {
                connection_id,
                identity,
            } => {
                if let Some(link) = self.links.remove(&connection_id) {
                    link.close().await;
                }
                self.emit(ClientEvent::MemberLeft {
                    connection_id,
                    identity,
                });
            }

            ServerMessage::RoomUpdate { members, .. } => {
                self.emit(ClientEvent::Roster { members });
            }

            ServerMessage::HostChanged {
                connection_id,
                identity,
            } => {
                let is_self = Some(connection_id) == self.connection_id;
                self.emit(ClientEvent::HostChanged {
                    connection_id,
                    identity,
                    is_self,
                });
            }

            ServerMessage::Locked { state } => self.emit(ClientEvent::Locked(state)),

            ServerMessage::Kicked { room_id } => {
                warn!("Kicked from room {}", room_id);
                self.room = None;
                self.close_links().await;
                self.emit(ClientEvent::Kicked);
            }

            ServerMessage::Knock {
                identity,
                requester_connection_id,
                ..
            } => {
                self.emit(ClientEvent::Knock {
                    identity,
                    requester: requester_connection_id,
                });
            }

            ServerMessage::Waiting => self.emit(ClientEvent::Waiting),

            ServerMessage::Approved { .. } => self.emit(ClientEvent::Approved),

            ServerMessage::Denied { reason, .. } => {
                self.room = None;
                self.emit(ClientEvent::Denied { reason });
            }

            ServerMessage::IncomingCall { from, offer, .. } => {
                let cmd = LinkCommand::RemoteOffer {
                    offer,
                    kind: OfferKind::Initial,
                };
                self.forward(from, cmd, true).await;
            }

            ServerMessage::CallAccepted { from, answer }
            | ServerMessage::RenegotiateFinal { from, answer } => {
                self.forward(from, LinkCommand::RemoteAnswer(answer), false)
                    .await;
            }

            ServerMessage::RenegotiateNeeded { from, offer } => {
                let cmd = LinkCommand::RemoteOffer {
                    offer,
                    kind: OfferKind::Renegotiation,
                };
                self.forward(from, cmd, true).await;
            }

            ServerMessage::Candidate { from, candidate } => {
                self.forward(from, LinkCommand::RemoteCandidate(candidate), false)
                    .await;
            }

            ServerMessage::Error { code, message } => {
                warn!("Server rejected a request ({:?}): {}", code, message);
                self.emit(ClientEvent::ServerError { code, message });
            }
        }
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Chat(text) => {
                for link in self.links.values() {
                    link.send(LinkCommand::SendChat(text.clone())).await;
                }
                self.prune_links();
            }

            RoomCommand::OfferFile { name, data, reply } => {
                let file = match self.ctx.library.register(name, data) {
                    Ok(file) => file,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return;
                    }
                };
                for link in self.links.values() {
                    link.send(LinkCommand::OfferFile(file.clone())).await;
                }
                self.prune_links();
                let _ = reply.send(Ok(file.transfer_id));
            }

            RoomCommand::AcceptTransfer {
                peer,
                transfer_id,
                reply,
            } => {
                let Some(link) = self.links.get(&peer) else {
                    let _ = reply.send(Err(TransferError::UnknownTransfer(transfer_id)));
                    return;
                };
                link.send(LinkCommand::AcceptTransfer { transfer_id, reply })
                    .await;
            }

            RoomCommand::CancelTransfer(transfer_id) => {
                for link in self.links.values() {
                    link.send(LinkCommand::CancelTransfer(transfer_id)).await;
                }
                self.prune_links();
            }

            RoomCommand::Lock(desired) => {
                self.signal_in_room(|room_id| ClientMessage::Lock { room_id, desired });
            }

            RoomCommand::Kick(target_connection_id) => {
                self.signal_in_room(|room_id| ClientMessage::Kick {
                    target_connection_id,
                    room_id,
                });
            }

            RoomCommand::Approve(requester_connection_id) => {
                self.signal_in_room(|room_id| ClientMessage::Approve {
                    requester_connection_id,
                    room_id,
                });
            }

            RoomCommand::Deny(requester_connection_id) => {
                self.signal_in_room(|room_id| ClientMessage::Deny {
                    requester_connection_id,
                    room_id,
                });
            }

            RoomCommand::Leave => {}
        }
    }

    /// Hands `cmd` to the link for `remote`, creating the link first if asked to.
    async fn forward(&mut self, remote: ConnectionId, cmd: LinkCommand, create: bool) {
        if self.links.get(&remote).is_some_and(LinkHandle::is_finished) {
            self.links.remove(&remote);
        }
        if create && !self.links.contains_key(&remote) {
            self.open_link(remote).await;
        }

        let Some(link) = self.links.get(&remote) else {
            debug!("No link to {:?}, dropping {:?}", remote, cmd);
            return;
        };
        if !link.send(cmd).await {
            self.links.remove(&remote);
        }
    }

    async fn open_link(&mut self, remote: ConnectionId) {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_BUFFER);
        let transport = match self
            .factory
            .create(remote, &self.ice_servers, transport_tx)
            .await
        {
            Ok(t) => t,
            Err(e) => {
                error!("Failed to create transport for {:?}: {}", remote, e);
                return;
            }
        };

        debug!("Opening link to {:?}", remote);
        let link = PeerLink::new(remote, transport, self.config.negotiation_timeout);
        self.links
            .insert(remote, spawn_link(link, transport_rx, &self.ctx));
    }

    fn prune_links(&mut self) {
        self.links.retain(|_, link| !link.is_finished());
    }

    async fn close_links(&mut self) {
        for (_, link) in self.links.drain() {
            link.close().await;
        }
    }

    fn leave(&mut self) {
        if let Some(room_id) = self.room.take() {
            info!("Leaving room {}", room_id);
            self.signal(ClientMessage::Leave { room_id });
        }
    }

    fn signal_in_room(&self, build: impl FnOnce(RoomId) -> ClientMessage) {
        match &self.room {
            Some(room_id) => self.signal(build(room_id.clone())),
            None => warn!("Not in a room, request dropped"),
        }
    }

    fn signal(&self, msg: ClientMessage) {
        let _ = self.ctx.signaling.send(msg);
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.ctx.events.send(event);
    }
}
