use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::registry::RoomRegistry;
use crate::session::relay::NegotiationRelay;
use crate::session::session_command::{SessionCommand, TimerEvent};
use crate::signaling::SignalingOutput;
use meshroom_core::{
    ClientMessage, ConnectionId, DenyReason, Identity, RoomId, ServerMessage,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct KnockTimer {
    knock_id: u64,
    handle: JoinHandle<()>,
}

/// Control-plane actor. Owns the [`RoomRegistry`] and handles one command at a
/// time, so every registry mutation happens inside a single handler call.
pub struct SessionCoordinator {
    registry: RoomRegistry,
    signaling: Arc<dyn SignalingOutput>,
    knock_timeout: Duration,
    command_rx: mpsc::Receiver<SessionCommand>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    knock_timers: HashMap<ConnectionId, KnockTimer>,
    next_knock_id: u64,
}

impl SessionCoordinator {
    pub fn new(
        config: &ServerConfig,
        command_rx: mpsc::Receiver<SessionCommand>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        Self {
            registry: RoomRegistry::new(),
            signaling,
            knock_timeout: config.knock_timeout,
            command_rx,
            timer_tx,
            timer_rx,
            knock_timers: HashMap::new(),
            next_knock_id: 0,
        }
    }

    pub async fn run(mut self) {
        info!("Session coordinator started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down coordinator.");
                            break;
                        }
                    }
                }

                Some(evt) = self.timer_rx.recv() => {
                    self.handle_timer(evt).await;
                }
            }
        }

        for (_, timer) in self.knock_timers.drain() {
            timer.handle.abort();
        }
        info!("Session coordinator finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Client {
                connection_id,
                message,
            } => {
                if let Err(e) = self.handle_message(connection_id, message).await {
                    warn!("Rejected request from {:?}: {}", connection_id, e);
                    self.signaling
                        .send(connection_id, ServerMessage::error(e.code(), e.to_string()))
                        .await;
                }
            }

            SessionCommand::Disconnect { connection_id } => {
                debug!("Connection {:?} closed", connection_id);
                self.depart(connection_id).await;
            }
        }
    }

    async fn handle_message(
        &mut self,
        from: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), SessionError> {
        match message {
            ClientMessage::Join { identity, room_id } => {
                self.join(from, identity, room_id).await;
                Ok(())
            }
            ClientMessage::Leave { room_id } => {
                self.leave(from, &room_id).await;
                Ok(())
            }
            ClientMessage::Lock { room_id, desired } => self.lock(from, room_id, desired).await,
            ClientMessage::Kick {
                target_connection_id,
                room_id,
            } => self.kick(from, target_connection_id, room_id).await,
            ClientMessage::Approve {
                requester_connection_id,
                room_id,
            } => self.approve(from, requester_connection_id, room_id).await,
            ClientMessage::Deny {
                requester_connection_id,
                room_id,
            } => self.deny(from, requester_connection_id, room_id).await,
            negotiation => {
                let from_identity = self.registry.identity_of(&from).cloned();
                if let Some(routed) = NegotiationRelay::route(from, from_identity, negotiation) {
                    self.signaling.send(routed.to, routed.message).await;
                }
                Ok(())
            }
        }
    }

    async fn handle_timer(&mut self, evt: TimerEvent) {
        match evt {
            TimerEvent::KnockExpired {
                requester,
                room_id,
                knock_id,
            } => {
                let current = self
                    .knock_timers
                    .get(&requester)
                    .is_some_and(|t| t.knock_id == knock_id);
                if !current {
                    return;
                }
                self.knock_timers.remove(&requester);

                if self.registry.take_pending(&room_id, &requester).is_some() {
                    info!(
                        "Knock from {:?} on room '{}' timed out",
                        requester, room_id
                    );
                    self.signaling
                        .send(
                            requester,
                            ServerMessage::Denied {
                                room_id,
                                reason: DenyReason::TimedOut,
                            },
                        )
                        .await;
                }
            }
        }
    }

    async fn join(&mut self, connection_id: ConnectionId, identity: Identity, room_id: RoomId) {
        if let Some(current) = self.registry.participant(&connection_id).cloned() {
            if current.room_id == room_id && current.identity == identity {
                if current.is_admitted() {
                    debug!("{:?} re-joined room '{}'", connection_id, room_id);
                    self.admit(connection_id, identity, room_id).await;
                } else {
                    self.signaling
                        .send(connection_id, ServerMessage::Waiting)
                        .await;
                }
                return;
            }

            info!(
                "{:?} switching from room '{}' to '{}'",
                connection_id, current.room_id, room_id
            );
            self.depart(connection_id).await;
        }

        if let Some(ghost) = self.registry.live_connection(&identity)
            && ghost != connection_id
        {
            info!(
                "Identity '{}' reconnected as {:?}, evicting {:?}",
                identity, connection_id, ghost
            );
            self.depart(ghost).await;
            self.signaling.close(ghost).await;
        }

        if !self.registry.is_locked(&room_id) {
            self.admit(connection_id, identity, room_id).await;
            return;
        }

        match self
            .registry
            .enqueue_knock(connection_id, identity.clone(), room_id.clone())
        {
            Ok(host) => {
                info!(
                    "'{}' knocked on locked room '{}'",
                    identity, room_id
                );
                self.signaling
                    .send(connection_id, ServerMessage::Waiting)
                    .await;
                self.signaling
                    .send(
                        host,
                        ServerMessage::Knock {
                            identity,
                            room_id: room_id.clone(),
                            requester_connection_id: connection_id,
                        },
                    )
                    .await;
                self.start_knock_timer(connection_id, room_id);
            }
            // A locked room always has a host; reaching this means it vanished.
            Err(e) => {
                warn!("Knock on room '{}' failed: {}", room_id, e);
                self.admit(connection_id, identity, room_id).await;
            }
        }
    }

    async fn admit(&mut self, connection_id: ConnectionId, identity: Identity, room_id: RoomId) {
        let admission = self
            .registry
            .admit(connection_id, identity.clone(), room_id.clone());

        info!(
            "{:?} ('{}') joined room '{}' as {:?}",
            connection_id, identity, room_id, admission.role
        );

        self.signaling
            .send(
                connection_id,
                ServerMessage::Joined {
                    identity: identity.clone(),
                    room_id: room_id.clone(),
                    connection_id,
                    existing_members: admission.existing_members.clone(),
                    role: admission.role,
                    locked: admission.locked,
                },
            )
            .await;

        if !admission.newly_added {
            return;
        }

        for member in &admission.existing_members {
            self.signaling
                .send(
                    member.connection_id,
                    ServerMessage::MemberJoined {
                        identity: identity.clone(),
                        connection_id,
                    },
                )
                .await;
        }

        self.broadcast_room_update(&room_id).await;
    }

    async fn leave(&mut self, connection_id: ConnectionId, room_id: &RoomId) {
        let in_room = self
            .registry
            .participant(&connection_id)
            .is_some_and(|p| &p.room_id == room_id);

        if !in_room {
            debug!(
                "Ignoring leave of room '{}' from non-participant {:?}",
                room_id, connection_id
            );
            return;
        }

        self.depart(connection_id).await;
    }

    /// Removes a connection from its room and fans out every consequence:
    /// departure, host transfer, closing of an emptied room.
    async fn depart(&mut self, connection_id: ConnectionId) {
        self.cancel_knock_timer(&connection_id);

        let Some(departure) = self.registry.remove(&connection_id) else {
            return;
        };

        if !departure.was_member {
            debug!(
                "Pending knock from {:?} on room '{}' withdrawn",
                connection_id, departure.room_id
            );
            return;
        }

        info!(
            "{:?} ('{}') left room '{}'",
            connection_id, departure.identity, departure.room_id
        );

        for member in &departure.remaining {
            self.signaling
                .send(
                    *member,
                    ServerMessage::MemberLeft {
                        connection_id,
                        identity: departure.identity.clone(),
                    },
                )
                .await;
        }

        for (knocker, _) in &departure.orphaned_knocks {
            self.cancel_knock_timer(knocker);
            self.signaling
                .send(
                    *knocker,
                    ServerMessage::Denied {
                        room_id: departure.room_id.clone(),
                        reason: DenyReason::RoomClosed,
                    },
                )
                .await;
        }

        if departure.room_closed {
            return;
        }

        if let Some(new_host) = departure.new_host {
            info!(
                "Host of room '{}' moved to {:?}",
                departure.room_id, new_host.connection_id
            );
            self.broadcast(
                &departure.room_id,
                ServerMessage::HostChanged {
                    connection_id: new_host.connection_id,
                    identity: new_host.identity,
                },
            )
            .await;

            for knock in self.registry.pending(&departure.room_id) {
                self.signaling
                    .send(
                        new_host.connection_id,
                        ServerMessage::Knock {
                            identity: knock.identity,
                            room_id: departure.room_id.clone(),
                            requester_connection_id: knock.connection_id,
                        },
                    )
                    .await;
            }
        }

        self.broadcast_room_update(&departure.room_id).await;
    }

    async fn lock(
        &mut self,
        by: ConnectionId,
        room_id: RoomId,
        desired: bool,
    ) -> Result<(), SessionError> {
        self.authorize_host(by, &room_id)?;
        self.registry.set_locked(&room_id, desired)?;

        info!("Room '{}' locked={}", room_id, desired);
        self.broadcast(&room_id, ServerMessage::Locked { state: desired })
            .await;
        Ok(())
    }

    async fn kick(
        &mut self,
        by: ConnectionId,
        target: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), SessionError> {
        self.authorize_host(by, &room_id)?;

        if target == by {
            debug!("Host {:?} tried to kick itself, ignored", by);
            return Ok(());
        }

        let is_member = self
            .registry
            .participant(&target)
            .is_some_and(|p| p.room_id == room_id && p.is_admitted());
        if !is_member {
            return Err(SessionError::NotMember(target, room_id));
        }

        info!("{:?} kicked {:?} from room '{}'", by, target, room_id);
        self.signaling
            .send(target, ServerMessage::Kicked { room_id })
            .await;
        self.depart(target).await;
        Ok(())
    }

    async fn approve(
        &mut self,
        by: ConnectionId,
        requester: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), SessionError> {
        self.authorize_host(by, &room_id)?;

        let identity = self
            .registry
            .take_pending(&room_id, &requester)
            .ok_or_else(|| SessionError::NotPending(requester, room_id.clone()))?;
        self.cancel_knock_timer(&requester);

        self.signaling
            .send(
                requester,
                ServerMessage::Approved {
                    room_id: room_id.clone(),
                },
            )
            .await;
        self.admit(requester, identity, room_id).await;
        Ok(())
    }

    async fn deny(
        &mut self,
        by: ConnectionId,
        requester: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), SessionError> {
        self.authorize_host(by, &room_id)?;

        if self.registry.take_pending(&room_id, &requester).is_none() {
            debug!(
                "Deny for {:?} on room '{}' has nothing pending, ignored",
                requester, room_id
            );
            return Ok(());
        }
        self.cancel_knock_timer(&requester);

        info!("Host denied {:?} entry to room '{}'", requester, room_id);
        self.signaling
            .send(
                requester,
                ServerMessage::Denied {
                    room_id,
                    reason: DenyReason::HostDenied,
                },
            )
            .await;
        Ok(())
    }

    fn authorize_host(&self, by: ConnectionId, room_id: &RoomId) -> Result<(), SessionError> {
        if self.registry.room(room_id).is_none() {
            return Err(SessionError::UnknownRoom(room_id.clone()));
        }
        if !self.registry.is_host(room_id, &by) {
            return Err(SessionError::NotHost(room_id.clone()));
        }
        Ok(())
    }

    fn start_knock_timer(&mut self, requester: ConnectionId, room_id: RoomId) {
        self.next_knock_id += 1;
        let knock_id = self.next_knock_id;
        let timer_tx = self.timer_tx.clone();
        let timeout = self.knock_timeout;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timer_tx.send(TimerEvent::KnockExpired {
                requester,
                room_id,
                knock_id,
            });
        });

        if let Some(previous) = self
            .knock_timers
            .insert(requester, KnockTimer { knock_id, handle })
        {
            previous.handle.abort();
        }
    }

    fn cancel_knock_timer(&mut self, requester: &ConnectionId) {
        if let Some(timer) = self.knock_timers.remove(requester) {
            timer.handle.abort();
        }
    }

    async fn broadcast(&self, room_id: &RoomId, msg: ServerMessage) {
        for member in self.registry.member_ids(room_id) {
            self.signaling.send(member, msg.clone()).await;
        }
    }

    async fn broadcast_room_update(&self, room_id: &RoomId) {
        let members = self.registry.members(room_id);
        self.broadcast(
            room_id,
            ServerMessage::RoomUpdate {
                total: members.len(),
                members,
            },
        )
        .await;
    }
}
